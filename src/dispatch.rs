//! The request dispatcher.
//!
//! ```text
//! OPTIONS ─────────────────────────────────────────────► CORS preflight, empty body
//! path ──decode──► app/action ──lookup──► 404 {"Msg": "doesn't exist"}
//!                       │
//!                    method ──────────────► 405 "<METHOD> not allowed on <path>"
//!                       │
//!                  validators ────────────► 401 {"Msg": "Auth failed, please try again"}
//!                       │
//!         unary ────────┴──────── stream
//!           │                        │
//!   handler (panic → abort)   handler → EventStream → session task
//!           │                        │
//!   encode (fail → 500)        text/event-stream
//!           │
//!   gzip when worthwhile
//! ```

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Body as HttpBody;
use tokio::sync::mpsc;
use tracing::{Instrument, Span, debug, field, info_span, warn};

use crate::auth::{self, Verdict};
use crate::compress;
use crate::error::Error;
use crate::host::Host;
use crate::method::Method;
use crate::request::Request;
use crate::response::{Body, INTERNAL_ERROR_BODY, Response};
use crate::route::{Route, RouteKind};
use crate::sse::{self, EventBody};
use crate::telemetry::panic_message;

// ── Wire constants ───────────────────────────────────────────────────────────

/// Body type of every response the dispatcher produces.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const VARY: &str = "Accept-Encoding, Authorization, Origin";
const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "OPTIONS, GET, HEAD, POST, PUT, PATCH, DELETE";
const ALLOW_HEADERS: &str = "Accept, Accept-Encoding, Accept-Language, Access-Control-Allow-Headers, \
    Access-Control-Allow-Methods, Access-Control-Allow-Origin, Access-Control-Max-Age, \
    Access-Control-Request-Headers, Access-Control-Request-Method, Authorization, Origin, \
    Cache-Control, Connection, Content-Type, Content-Encoding, Content-Length, Sec-Fetch-Dest, \
    Sec-Fetch-Mode, Sec-Fetch-Site, X-Requested-With";

/// Capacity of the channel between a session task and its response body.
const EVENT_BUFFER: usize = 16;

// ── Dispatch ─────────────────────────────────────────────────────────────────

impl Host {
    /// Routes one request and produces its response.
    ///
    /// Every outcome the client should see is an `Ok` response. `Err` means
    /// no response must be written at all: the handler panicked, and the
    /// caller should drop the connection.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> Result<http::Response<ResponseBody>, Error>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: std::fmt::Display,
    {
        self.dispatch_with(req, true).await
    }

    /// Like [`dispatch`](Host::dispatch), for transports that cannot flush a
    /// response incrementally. Streaming routes answer 404 here.
    pub async fn dispatch_buffered<B>(&self, req: http::Request<B>) -> Result<http::Response<ResponseBody>, Error>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: std::fmt::Display,
    {
        self.dispatch_with(req, false).await
    }

    async fn dispatch_with<B>(&self, req: http::Request<B>, can_stream: bool) -> Result<http::Response<ResponseBody>, Error>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();

        if parts.method == http::Method::OPTIONS {
            return Ok(preflight());
        }

        let request = Request::new(
            Arc::clone(&self.context),
            parts.method.as_str().to_owned(),
            parts.uri.path().to_owned(),
            parts.uri.query(),
            parts.headers,
        );
        let span = info_span!(
            "request",
            id = %request.id(),
            method = %request.method(),
            path = %request.path(),
            app = field::Empty,
            action = field::Empty,
        );
        self.route(request, body, can_stream).instrument(span).await
    }

    async fn route<B>(&self, mut request: Request, body: B, can_stream: bool) -> Result<http::Response<ResponseBody>, Error>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: std::fmt::Display,
    {
        let accept_encoding = request.header(header::ACCEPT_ENCODING.as_str()).map(str::to_owned);
        let accept_encoding = accept_encoding.as_deref();
        let telemetry = self.context.telemetry();

        let Some(resolved) = self.table.resolve(request.path()) else {
            telemetry.capture_message(&format!(
                "{}: invalid route {} encountered",
                request.id(),
                request.path()
            ));
            return Ok(self.render(Response::not_found(), &request, accept_encoding));
        };
        Span::current().record("app", resolved.app.as_str()).record("action", resolved.action.as_str());
        request.app = resolved.app;
        request.action = resolved.action;

        let route: Option<&Route> = Method::from_str(request.method())
            .ok()
            .and_then(|method| resolved.methods.get(&method));
        let Some(route) = route else {
            let resp = Response::method_not_allowed(request.method(), request.path());
            return Ok(self.render(resp, &request, accept_encoding));
        };

        if route.is_stream() && !can_stream {
            telemetry.capture_message(&format!(
                "{}: route {} of app {} needs a streaming transport",
                request.id(),
                request.action,
                request.app
            ));
            return Ok(self.render(Response::not_found(), &request, accept_encoding));
        }

        match auth::evaluate(&route.validators, &self.context, &request).await {
            Verdict::Public => {}
            Verdict::Granted(outcome) => request.auth = outcome,
            Verdict::Denied => return Ok(self.render(Response::auth_failed(), &request, accept_encoding)),
        }

        match body.collect().await {
            Ok(collected) => request.body = collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "failed to read request body");
                return Ok(self.render(Response::client_error(e), &request, accept_encoding));
            }
        }

        match &route.kind {
            RouteKind::Unary(handler) => {
                let handler = Arc::clone(handler);
                let call = request.clone();
                let caught = AssertUnwindSafe(async move { handler.call(call).await })
                    .catch_unwind()
                    .await;
                match caught {
                    Ok(resp) => Ok(self.render(resp, &request, accept_encoding)),
                    Err(payload) => Err(self.report_panic(&request, payload.as_ref())),
                }
            }
            RouteKind::Stream(handler) => {
                let handler = Arc::clone(handler);
                let call = request.clone();
                let caught = AssertUnwindSafe(async move { handler.call(call).await })
                    .catch_unwind()
                    .await;
                match caught {
                    Ok(events) => Ok(self.open_stream(events, request)),
                    Err(payload) => Err(self.report_panic(&request, payload.as_ref())),
                }
            }
        }
    }

    fn report_panic(&self, request: &Request, payload: &(dyn std::any::Any + Send)) -> Error {
        self.context.telemetry().capture_message(&format!(
            "{}: API ({}) crashed: {}",
            request.id(),
            request.path(),
            panic_message(payload)
        ));
        Error::HandlerPanicked { request_id: request.id().to_owned() }
    }

    fn open_stream(&self, events: sse::EventStream, request: Request) -> http::Response<ResponseBody> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let disconnect = request.cancellation().clone().drop_guard();
        let heartbeat = self.context.config().sse_heartbeat();
        tokio::spawn(sse::run_session(events, request, tx, heartbeat).instrument(Span::current()));

        let mut headers = common_headers();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let mut response = http::Response::new(EventBody::new(rx, disconnect).boxed_unsync());
        *response.headers_mut() = headers;
        response
    }

    /// Turns a handler's [`Response`] into the wire response.
    fn render(&self, resp: Response, request: &Request, accept_encoding: Option<&str>) -> http::Response<ResponseBody> {
        let Response { status, headers: extra, body } = resp;

        let bytes = match body {
            Body::Text(s) => Bytes::from(s),
            Body::Bytes(b) => b,
            Body::Value(value) => match value.encode() {
                Ok(encoded) => Bytes::from(encoded),
                Err(e) => {
                    self.context.telemetry().capture_error(
                        &format!("{}: failed to encode response body for {}", request.id(), request.path()),
                        &e,
                    );
                    let body = Bytes::from_static(INTERNAL_ERROR_BODY.as_bytes());
                    return finish(StatusCode::INTERNAL_SERVER_ERROR, common_headers(), body, accept_encoding);
                }
            },
        };

        let mut headers = common_headers();
        for (name, value) in extra {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        debug!(status = status.as_u16(), "request served");
        finish(status, headers, bytes, accept_encoding)
    }
}

// ── Response assembly ────────────────────────────────────────────────────────

fn common_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(header::VARY, HeaderValue::from_static(VARY));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOW_ORIGIN));
    headers
}

fn preflight() -> http::Response<ResponseBody> {
    let mut headers = HeaderMap::new();
    headers.insert(header::VARY, HeaderValue::from_static(VARY));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOW_ORIGIN));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));

    let mut response = http::Response::new(Full::new(Bytes::new()).boxed_unsync());
    *response.headers_mut() = headers;
    response
}

fn finish(status: StatusCode, mut headers: HeaderMap, body: Bytes, accept_encoding: Option<&str>) -> http::Response<ResponseBody> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let content_encoding = headers.get(header::CONTENT_ENCODING).and_then(|v| v.to_str().ok());

    let body = if compress::should_compress(body.len(), accept_encoding, content_type, content_encoding) {
        match compress::gzip(&body) {
            Ok(packed) => {
                headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                Bytes::from(packed)
            }
            Err(e) => {
                debug!(error = %e, "gzip failed, sending uncompressed");
                body
            }
        }
    } else {
        body
    };

    let mut response = http::Response::new(Full::new(body).boxed_unsync());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
