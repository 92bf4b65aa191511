//! Server-sent event sessions.
//!
//! A streaming handler returns an [`EventStream`]. The dispatcher answers with
//! `text/event-stream` right away and hands the stream to a per-connection
//! session loop. Each iteration resolves exactly one of:
//!
//! 1. the client went away → close callback, stop
//! 2. the producer yielded `Data` → write one event, flush
//! 3. the producer yielded `Error` or ended → close callback, stop
//! 4. the heartbeat timer fired → write a keep-alive comment, flush
//!
//! so events reach a given client in the order the producer emitted them.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use hyper::body::{Body, Frame};
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::info;

use crate::error::BoxError;
use crate::request::Request;

pub(crate) const KEEP_ALIVE: &[u8] = b": ping\n\n";

/// One item produced by a streaming handler.
#[derive(Debug)]
pub enum StreamEvent {
    Data(String),
    Error(BoxError),
}

type OnClose = Box<dyn FnOnce(&Request) + Send + 'static>;

/// What a streaming handler hands back: the event source plus a callback run
/// once when the session ends.
pub struct EventStream {
    events: BoxStream<'static, StreamEvent>,
    on_close: OnClose,
}

impl EventStream {
    pub fn new(
        events: impl Stream<Item = StreamEvent> + Send + 'static,
        on_close: impl FnOnce(&Request) + Send + 'static,
    ) -> Self {
        Self { events: events.boxed(), on_close: Box::new(on_close) }
    }

    /// Merges a data channel and an error channel into one stream.
    pub fn from_channels(
        data: mpsc::Receiver<String>,
        errors: mpsc::Receiver<BoxError>,
        on_close: impl FnOnce(&Request) + Send + 'static,
    ) -> Self {
        let data = receiver_stream(data).map(StreamEvent::Data);
        let errors = receiver_stream(errors).map(StreamEvent::Error);
        Self::new(stream::select(data, errors), on_close)
    }
}

fn receiver_stream<T: Send + 'static>(mut rx: mpsc::Receiver<T>) -> impl Stream<Item = T> + Send + 'static {
    stream::poll_fn(move |cx| rx.poll_recv(cx))
}

/// Encodes `data` as one SSE event, one `data:` line per payload line.
pub(crate) fn encode_event(data: &str) -> Bytes {
    let mut frame = String::with_capacity(data.len() + 8);
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line.strip_suffix('\r').unwrap_or(line));
        frame.push('\n');
    }
    frame.push('\n');
    Bytes::from(frame)
}

/// Response body fed by the session loop.
///
/// Dropping it (hyper does so when the client disconnects) cancels the
/// request's token through the guard, which ends the session.
pub(crate) struct EventBody {
    rx: mpsc::Receiver<Bytes>,
    _disconnect: DropGuard,
}

impl EventBody {
    pub(crate) fn new(rx: mpsc::Receiver<Bytes>, disconnect: DropGuard) -> Self {
        Self { rx, _disconnect: disconnect }
    }
}

impl Body for EventBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(|bytes| Ok(Frame::data(bytes))))
    }
}

/// Drives one session until the client leaves or the producer stops.
pub(crate) async fn run_session(stream: EventStream, req: Request, out: mpsc::Sender<Bytes>, heartbeat: Duration) {
    let EventStream { mut events, on_close } = stream;
    let cancel = req.cancellation().clone();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                info!(request_id = %req.id(), principal = ?req.principal_id(), "connection closed");
                break;
            }

            event = events.next() => match event {
                Some(StreamEvent::Data(data)) => {
                    // A failed send means the body is gone; the cancel arm ends the loop next.
                    let _ = out.send(encode_event(&data)).await;
                }
                Some(StreamEvent::Error(e)) => {
                    info!(request_id = %req.id(), principal = ?req.principal_id(), error = %e, "closing connection because of error");
                    break;
                }
                None => {
                    info!(request_id = %req.id(), "event source ended, closing connection");
                    break;
                }
            },

            () = tokio::time::sleep(heartbeat) => {
                let _ = out.send(Bytes::from_static(KEEP_ALIVE)).await;
            }
        }
    }

    on_close(&req);
}
