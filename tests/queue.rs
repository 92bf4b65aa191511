mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use common::RecordingTelemetry;
use switchyard::queue::{
    Cleanup, InboundMessage, MemoryQueue, Outcome, QueueError, QueueMessage, QueueRoute, QueueTransport,
    ReceiptHandle,
};
use switchyard::{App, Config, Host};

#[derive(Default)]
struct Counters {
    seen: Mutex<Vec<QueueMessage>>,
    cleanups: Mutex<Vec<String>>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Counters {
    fn seen(&self) -> Vec<QueueMessage> {
        self.seen.lock().unwrap().clone()
    }

    fn cleanups(&self) -> Vec<String> {
        self.cleanups.lock().unwrap().clone()
    }

    fn cleanup(self: &Arc<Self>) -> Cleanup {
        let counters = Arc::clone(self);
        Cleanup::new(move |request_id| counters.cleanups.lock().unwrap().push(request_id.to_owned()))
    }
}

struct Worker {
    counters: Arc<Counters>,
}

impl App for Worker {
    fn title(&self) -> &str {
        "worker"
    }

    fn routes(&self) -> Vec<switchyard::Route> {
        Vec::new()
    }

    fn queue_handlers(&self) -> Vec<QueueRoute> {
        let ok = Arc::clone(&self.counters);
        let retry = Arc::clone(&self.counters);
        let poison = Arc::clone(&self.counters);
        let flaky = Arc::clone(&self.counters);
        let slow = Arc::clone(&self.counters);
        vec![
            QueueRoute::new("ok", move |msg: QueueMessage| {
                let counters = Arc::clone(&ok);
                async move {
                    counters.seen.lock().unwrap().push(msg);
                    Outcome::done(counters.cleanup())
                }
            }),
            QueueRoute::new("retry", move |msg: QueueMessage| {
                let counters = Arc::clone(&retry);
                async move {
                    counters.seen.lock().unwrap().push(msg);
                    Outcome::new(counters.cleanup(), Err(switchyard::queue::HandlerError::retry("not yet")))
                }
            }),
            QueueRoute::new("poison", move |msg: QueueMessage| {
                let counters = Arc::clone(&poison);
                async move {
                    counters.seen.lock().unwrap().push(msg);
                    Outcome::force_delete(counters.cleanup(), "malformed payload")
                }
            }),
            QueueRoute::new("flaky", move |msg: QueueMessage| {
                let counters = Arc::clone(&flaky);
                async move {
                    if msg.body == "boom" {
                        panic!("handler blew up");
                    }
                    counters.seen.lock().unwrap().push(msg);
                    Outcome::done(counters.cleanup())
                }
            }),
            QueueRoute::new("slow", move |msg: QueueMessage| {
                let counters = Arc::clone(&slow);
                async move {
                    let now = counters.current.fetch_add(1, Ordering::SeqCst) + 1;
                    counters.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    counters.current.fetch_sub(1, Ordering::SeqCst);
                    counters.seen.lock().unwrap().push(msg);
                    Outcome::ack()
                }
            }),
        ]
    }
}

struct Fixture {
    queue: Arc<MemoryQueue>,
    counters: Arc<Counters>,
    telemetry: Arc<RecordingTelemetry>,
}

async fn start(max_in_flight: Option<usize>) -> Fixture {
    let mut config = Config::default();
    config.queues = ["ok", "retry", "poison", "flaky", "slow"]
        .into_iter()
        .map(|r| (r.to_owned(), format!("q-{r}")))
        .collect::<HashMap<_, _>>();
    config.consumer.max_in_flight = max_in_flight;

    let queue = Arc::new(MemoryQueue::with_queues(config.queues.values().cloned()));
    let counters = Arc::new(Counters::default());
    let telemetry = RecordingTelemetry::new();

    let host = Host::builder(config)
        .telemetry(telemetry.clone())
        .queue_transport(queue.clone())
        .app(Worker { counters: Arc::clone(&counters) })
        .build()
        .unwrap();
    let handles = host.start_consumers().await.unwrap();
    assert_eq!(handles.len(), 5);

    Fixture { queue, counters, telemetry }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    // Virtual time: this covers two minutes without slowing the test down.
    for _ in 0..2400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn successful_message_is_deleted_then_cleaned_up() {
    let f = start(None).await;
    f.queue.push("q-ok", r#"{"order": 1}"#, Some("tenant-9")).unwrap();

    wait_until(|| f.counters.cleanups().len() == 1).await;
    let stats = f.queue.stats("q-ok").unwrap();
    assert_eq!((stats.deleted, stats.depth), (1, 0));

    let seen = f.counters.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].body, r#"{"order": 1}"#);
    assert_eq!(seen[0].custom_attribute(), "tenant-9");
    assert_eq!(f.counters.cleanups(), vec![seen[0].request_id.clone()]);
}

#[tokio::test(start_paused = true)]
async fn every_message_gets_a_fresh_request_id() {
    let f = start(None).await;
    for i in 0..3 {
        f.queue.push("q-ok", &i.to_string(), None).unwrap();
    }

    wait_until(|| f.counters.cleanups().len() == 3).await;
    let mut ids: Vec<String> = f.counters.seen().into_iter().map(|m| m.request_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(f.counters.seen().iter().all(|m| m.custom_attribute().is_empty()));
}

#[tokio::test(start_paused = true)]
async fn retryable_error_keeps_the_message_and_skips_cleanup() {
    let f = start(None).await;
    f.queue.push("q-retry", "later", None).unwrap();

    wait_until(|| !f.counters.seen().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let stats = f.queue.stats("q-retry").unwrap();
    assert_eq!((stats.deleted, stats.depth), (0, 1));
    assert!(f.counters.cleanups().is_empty());
    assert!(f.telemetry.contains("not yet"));
}

#[tokio::test(start_paused = true)]
async fn retried_message_is_redelivered_after_the_visibility_timeout() {
    let f = start(None).await;
    f.queue.push("q-retry", "later", None).unwrap();

    wait_until(|| f.counters.seen().len() >= 2).await;
    let seen = f.counters.seen();
    assert_ne!(seen[0].request_id, seen[1].request_id);
}

#[tokio::test(start_paused = true)]
async fn poison_message_is_deleted_and_reported() {
    let f = start(None).await;
    f.queue.push("q-poison", "garbage", None).unwrap();

    wait_until(|| f.queue.stats("q-poison").unwrap().deleted == 1).await;
    wait_until(|| f.counters.cleanups().len() == 1).await;
    assert!(f.telemetry.contains("poison message"));
    assert!(f.telemetry.contains("malformed payload"));
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_block_siblings_or_later_polls() {
    let f = start(None).await;
    f.queue.push("q-flaky", "boom", None).unwrap();
    f.queue.push("q-flaky", "fine", None).unwrap();

    wait_until(|| f.counters.seen().iter().any(|m| m.body == "fine")).await;
    assert!(f.telemetry.contains("RECOVER from panic"));

    f.queue.push("q-flaky", "after", None).unwrap();
    wait_until(|| f.counters.seen().iter().any(|m| m.body == "after")).await;

    wait_until(|| f.queue.stats("q-flaky").unwrap().deleted == 2).await;
    assert_eq!(f.queue.stats("q-flaky").unwrap().depth, 1);
}

#[tokio::test(start_paused = true)]
async fn bounded_fan_out_caps_concurrent_handlers() {
    let f = start(Some(2)).await;
    for i in 0..6 {
        f.queue.push("q-slow", &i.to_string(), None).unwrap();
    }

    wait_until(|| f.counters.seen().len() == 6).await;
    assert_eq!(f.counters.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn unbounded_fan_out_runs_a_batch_concurrently() {
    let f = start(None).await;
    for i in 0..6 {
        f.queue.push("q-slow", &i.to_string(), None).unwrap();
    }

    wait_until(|| f.counters.seen().len() == 6).await;
    assert_eq!(f.counters.peak.load(Ordering::SeqCst), 6);
}

/// Fails every receive, recording when it was called.
#[derive(Default)]
struct Broken {
    receives: Mutex<Vec<Instant>>,
}

#[async_trait]
impl QueueTransport for Broken {
    async fn queue_url(&self, name: &str) -> Result<String, QueueError> {
        Ok(format!("broken://{name}"))
    }

    async fn receive(&self, _url: &str, _max: u32, _wait: Duration) -> Result<Vec<InboundMessage>, QueueError> {
        self.receives.lock().unwrap().push(Instant::now());
        Err(QueueError::Transport("connection refused".into()))
    }

    async fn delete(&self, _url: &str, _receipt: &ReceiptHandle) -> Result<(), QueueError> {
        Ok(())
    }

    async fn send(&self, _url: &str, _body: &str, _attr: Option<&str>) -> Result<String, QueueError> {
        Ok(String::new())
    }
}

#[tokio::test(start_paused = true)]
async fn poll_failures_back_off_and_keep_polling() {
    let mut config = Config::default();
    config.queues.insert("ok".into(), "q-ok".into());
    let transport = Arc::new(Broken::default());
    let telemetry = RecordingTelemetry::new();

    struct OnlyOk;
    impl App for OnlyOk {
        fn title(&self) -> &str {
            "only-ok"
        }
        fn routes(&self) -> Vec<switchyard::Route> {
            Vec::new()
        }
        fn queue_handlers(&self) -> Vec<QueueRoute> {
            vec![QueueRoute::new("ok", |_msg: QueueMessage| async { Outcome::ack() })]
        }
    }

    let host = Host::builder(config)
        .telemetry(telemetry.clone())
        .queue_transport(transport.clone())
        .app(OnlyOk)
        .build()
        .unwrap();
    host.start_consumers().await.unwrap();

    wait_until(|| transport.receives.lock().unwrap().len() >= 2).await;
    let receives = transport.receives.lock().unwrap().clone();
    assert!(receives[1] - receives[0] >= Duration::from_secs(30));
    assert!(telemetry.contains("connection refused"));
}

/// Delivers from an in-memory queue but fails every delete.
struct Undeletable {
    inner: MemoryQueue,
    deletes: AtomicUsize,
    receives: AtomicUsize,
}

#[async_trait]
impl QueueTransport for Undeletable {
    async fn queue_url(&self, name: &str) -> Result<String, QueueError> {
        self.inner.queue_url(name).await
    }

    async fn receive(&self, url: &str, max: u32, wait: Duration) -> Result<Vec<InboundMessage>, QueueError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        self.inner.receive(url, max, wait).await
    }

    async fn delete(&self, _url: &str, _receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::Transport("delete rejected".into()))
    }

    async fn send(&self, url: &str, body: &str, attr: Option<&str>) -> Result<String, QueueError> {
        self.inner.send(url, body, attr).await
    }
}

#[tokio::test(start_paused = true)]
async fn failed_delete_still_runs_cleanup_and_keeps_polling() {
    let mut config = Config::default();
    config.queues.insert("ok".into(), "q-ok".into());
    let transport = Arc::new(Undeletable {
        inner: MemoryQueue::with_queues(["q-ok"]),
        deletes: AtomicUsize::new(0),
        receives: AtomicUsize::new(0),
    });
    let counters = Arc::new(Counters::default());

    struct Cleaned {
        counters: Arc<Counters>,
    }
    impl App for Cleaned {
        fn title(&self) -> &str {
            "cleaned"
        }
        fn routes(&self) -> Vec<switchyard::Route> {
            Vec::new()
        }
        fn queue_handlers(&self) -> Vec<QueueRoute> {
            let counters = Arc::clone(&self.counters);
            vec![QueueRoute::new("ok", move |msg: QueueMessage| {
                let counters = Arc::clone(&counters);
                async move {
                    counters.seen.lock().unwrap().push(msg);
                    Outcome::done(counters.cleanup())
                }
            })]
        }
    }

    let host = Host::builder(config)
        .queue_transport(transport.clone())
        .app(Cleaned { counters: Arc::clone(&counters) })
        .build()
        .unwrap();
    host.start_consumers().await.unwrap();
    transport.inner.push("q-ok", "once", None).unwrap();

    wait_until(|| counters.cleanups().len() == 1).await;
    assert_eq!(transport.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(counters.seen().len(), 1);

    let polled = transport.receives.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(transport.receives.load(Ordering::SeqCst) > polled);
    assert_eq!(transport.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(counters.cleanups().len(), 1);
    assert_eq!(transport.inner.stats("q-ok").unwrap().depth, 1);
}
