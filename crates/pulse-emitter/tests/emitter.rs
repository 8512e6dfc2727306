use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulse_emitter::{
    BufferOption, Emitter, EmitterConfig, EmitterStatus, HttpMethod, Request, RequestResult,
    Transport,
};
use pulse_store::{EventStore, EvictionPolicy, MemoryEventStore, StoreError, StoredEvent};
use pulse_types::{EventBus, Notification, Payload};

// ── Test doubles ─────────────────────────────────────────────────────

type StatusFn = dyn Fn(&Request) -> Option<u16> + Send + Sync;

/// Answers every request with a status chosen by `status`, recording what
/// it was sent.
struct MockTransport {
    method: HttpMethod,
    status: Box<StatusFn>,
    delay: Duration,
    calls: AtomicUsize,
    sent: Mutex<Vec<Payload>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    fn new(method: HttpMethod, status: impl Fn(&Request) -> Option<u16> + Send + Sync + 'static) -> Arc<Self> {
        Self::with_delay(method, Duration::ZERO, status)
    }

    fn with_delay(
        method: HttpMethod,
        delay: Duration,
        status: impl Fn(&Request) -> Option<u16> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            method,
            status: Box::new(status),
            delay,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn always(method: HttpMethod, status: u16) -> Arc<Self> {
        Self::new(method, move |_| Some(status))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<Payload> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl Transport for MockTransport {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn send(&self, request: &Request) -> RequestResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.sent
            .lock()
            .expect("sent lock")
            .extend(request.payloads.iter().cloned());
        let status = (self.status)(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        RequestResult::for_request(request, status)
    }
}

/// A memory store whose removals can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryEventStore,
    fail_removes: AtomicBool,
}

impl EventStore for FlakyStore {
    fn insert(&self, payload: &Payload) -> Result<i64, StoreError> {
        self.inner.insert(payload)
    }

    fn emittable(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        self.inner.emittable(limit)
    }

    fn remove(&self, ids: &[i64]) -> Result<usize, StoreError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.remove(ids)
    }

    fn remove_all(&self) -> Result<usize, StoreError> {
        self.inner.remove_all()
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.inner.count()
    }

    fn remove_old(&self, policy: EvictionPolicy) -> Result<usize, StoreError> {
        self.inner.remove_old(policy)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn payload(n: usize) -> Payload {
    [
        ("e".to_string(), "se".to_string()),
        ("eid".to_string(), format!("event-{n}")),
    ]
    .into_iter()
    .collect()
}

fn fill(store: &dyn EventStore, n: usize) {
    for i in 0..n {
        store.insert(&payload(i)).expect("insert");
    }
}

fn config() -> EmitterConfig {
    EmitterConfig {
        buffer: BufferOption::SmallGroup,
        emit_interval: Duration::from_millis(50),
        ..EmitterConfig::default()
    }
}

fn count(store: &dyn EventStore) -> usize {
    store.count().expect("count")
}

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    done()
}

// ── Pause and resume ─────────────────────────────────────────────────

#[tokio::test]
async fn paused_emitter_keeps_events_until_resumed() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let emitter = Emitter::new(store.clone(), transport.clone(), config(), EventBus::default());

    emitter.pause();
    emitter.start().expect("start inside runtime");
    fill(store.as_ref(), 30);
    emitter.flush();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(emitter.status(), EmitterStatus::Paused);
    assert_eq!(count(store.as_ref()), 30);
    assert_eq!(transport.calls(), 0);

    emitter.resume();
    assert!(wait_until(|| count(store.as_ref()) == 0).await, "store drains after resume");
    assert_eq!(transport.sent().len(), 30);
}

#[tokio::test]
async fn running_emitter_drains_on_flush() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Get, 200);
    let emitter = Emitter::new(
        store.clone(),
        transport.clone(),
        EmitterConfig {
            emit_interval: Duration::from_secs(3600),
            ..config()
        },
        EventBus::default(),
    );
    emitter.start().expect("start inside runtime");

    fill(store.as_ref(), 3);
    emitter.flush();

    assert!(wait_until(|| count(store.as_ref()) == 0).await);
    assert_eq!(transport.calls(), 3, "GET sends one row per request");
}

#[test]
fn start_requires_a_runtime() {
    let emitter = Emitter::new(
        Arc::new(MemoryEventStore::new()),
        MockTransport::always(HttpMethod::Post, 200),
        config(),
        EventBus::default(),
    );
    assert!(emitter.start().is_err());
}

// ── Retry policy ─────────────────────────────────────────────────────

#[tokio::test]
async fn terminal_failures_drain_store_regardless_of_retry_setting() {
    for retry in [true, false] {
        let store = Arc::new(MemoryEventStore::new());
        let transport = MockTransport::always(HttpMethod::Post, 400);
        let emitter = Emitter::new(
            store.clone(),
            transport.clone(),
            EmitterConfig {
                retry_failed_requests: retry,
                emit_range: 100,
                ..config()
            },
            EventBus::default(),
        );

        fill(store.as_ref(), 40);
        let report = emitter.drain().await;

        assert_eq!(count(store.as_ref()), 0, "retry = {retry}");
        assert_eq!(report.dropped, 40);
        assert_eq!(transport.calls(), 4, "40 rows in groups of 10");
    }
}

#[tokio::test]
async fn transient_failures_are_retained_and_not_resent_in_same_drain() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 503);
    let emitter = Emitter::new(store.clone(), transport.clone(), config(), EventBus::default());

    fill(store.as_ref(), 12);
    let report = emitter.drain().await;

    assert_eq!(report.retained, 12);
    assert_eq!(count(store.as_ref()), 12);
    assert_eq!(transport.calls(), 2, "one cycle only");
}

#[tokio::test]
async fn disabled_retry_drops_transient_failures() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 503);
    let emitter = Emitter::new(
        store.clone(),
        transport,
        EmitterConfig {
            retry_failed_requests: false,
            ..config()
        },
        EventBus::default(),
    );

    fill(store.as_ref(), 5);
    emitter.drain().await;
    assert_eq!(count(store.as_ref()), 0);
}

#[tokio::test]
async fn oversize_requests_are_never_retried() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 500);
    let emitter = Emitter::new(
        store.clone(),
        transport,
        EmitterConfig {
            byte_limit_post: 300,
            ..config()
        },
        EventBus::default(),
    );

    let mut big = payload(99);
    big.insert("se_la", "x".repeat(1_000));
    store.insert(&payload(1)).expect("insert small");
    let big_id = store.insert(&big).expect("insert big");

    let report = emitter.drain().await;

    assert_eq!(report.dropped, 1);
    assert_eq!(report.retained, 1);
    let left: Vec<i64> = store
        .emittable(10)
        .expect("read")
        .iter()
        .map(|r| r.id)
        .collect();
    assert!(!left.contains(&big_id));
    assert_eq!(left.len(), 1);
}

#[tokio::test]
async fn custom_override_applies_to_its_code_only() {
    // 500 is normally retried, 403 normally dropped; the overrides flip both.
    let overrides = HashMap::from([(500, false), (403, true)]);
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::new(HttpMethod::Get, |request| {
        match request.payloads[0].get("eid") {
            Some("event-0") => Some(500),
            Some("event-1") => Some(403),
            Some("event-2") => Some(401),
            _ => Some(502),
        }
    });
    let emitter = Emitter::new(
        store.clone(),
        transport,
        EmitterConfig {
            custom_retry_for_status_codes: overrides,
            ..config()
        },
        EventBus::default(),
    );

    fill(store.as_ref(), 4);
    emitter.drain().await;

    let left: Vec<String> = store
        .emittable(10)
        .expect("read")
        .iter()
        .filter_map(|r| r.payload.get("eid").map(str::to_string))
        .collect();
    assert_eq!(left, vec!["event-1".to_string(), "event-3".to_string()]);
}

#[tokio::test]
async fn missing_response_is_retried() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::new(HttpMethod::Post, |_| None);
    let emitter = Emitter::new(store.clone(), transport, config(), EventBus::default());

    fill(store.as_ref(), 3);
    let report = emitter.drain().await;

    assert_eq!(report.retained, 3);
    assert_eq!(count(store.as_ref()), 3);
}

// ── Store failures ───────────────────────────────────────────────────

#[tokio::test]
async fn removal_failure_pauses_until_resumed() {
    let store = Arc::new(FlakyStore::default());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let emitter = Emitter::new(store.clone(), transport.clone(), config(), bus);

    fill(store.as_ref(), 5);
    store.fail_removes.store(true, Ordering::SeqCst);
    emitter.drain().await;

    assert_eq!(emitter.status(), EmitterStatus::Paused);
    assert_eq!(count(store.as_ref()), 5);
    let calls = transport.calls();

    emitter.drain().await;
    assert_eq!(transport.calls(), calls, "no drains while paused");

    let mut saw_pause = false;
    while let Ok(n) = rx.try_recv() {
        saw_pause |= matches!(n, Notification::EmitterPaused { .. });
    }
    assert!(saw_pause, "pause is published");

    store.fail_removes.store(false, Ordering::SeqCst);
    emitter.resume();
    emitter.drain().await;
    assert_eq!(count(store.as_ref()), 0);
    assert_eq!(emitter.status(), EmitterStatus::Running);
}

// ── Dispatch ─────────────────────────────────────────────────────────

#[tokio::test]
async fn sends_are_bounded_by_worker_pool() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::with_delay(HttpMethod::Get, Duration::from_millis(30), |_| Some(200));
    let emitter = Emitter::new(
        store.clone(),
        transport.clone(),
        EmitterConfig {
            thread_pool_size: 2,
            ..config()
        },
        EventBus::default(),
    );

    fill(store.as_ref(), 8);
    emitter.drain().await;

    assert_eq!(count(store.as_ref()), 0);
    assert_eq!(transport.calls(), 8);
    let max = transport.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "at most two sends in flight, saw {max}");
}

#[tokio::test]
async fn sent_timestamp_is_added_at_send_time() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let emitter = Emitter::new(store.clone(), transport.clone(), config(), EventBus::default());

    fill(store.as_ref(), 1);
    assert!(store.emittable(1).expect("read")[0].payload.get("stm").is_none());
    emitter.drain().await;

    let sent = transport.sent();
    assert!(sent[0].get("stm").is_some_and(|v| v.parse::<i64>().is_ok()));
}

#[tokio::test]
async fn drain_continues_past_emit_range_while_successful() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let emitter = Emitter::new(
        store.clone(),
        transport,
        EmitterConfig {
            emit_range: 10,
            ..config()
        },
        EventBus::default(),
    );

    fill(store.as_ref(), 35);
    let report = emitter.drain().await;

    assert_eq!(report.sent, 35);
    assert_eq!(count(store.as_ref()), 0);
}

#[tokio::test]
async fn cycle_reports_outcome_on_bus() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::new(HttpMethod::Get, |request| {
        if request.payloads[0].get("eid") == Some("event-0") {
            Some(200)
        } else {
            Some(500)
        }
    });
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let emitter = Emitter::new(store.clone(), transport, config(), bus);

    fill(store.as_ref(), 3);
    emitter.drain().await;

    let got = rx.recv().await.expect("notification");
    assert_eq!(got, Notification::RequestsCompleted { sent: 1, failed: 2 });
}

#[tokio::test]
async fn eviction_runs_before_each_cycle() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let emitter = Emitter::new(
        store.clone(),
        transport.clone(),
        EmitterConfig {
            eviction: EvictionPolicy {
                max_rows: Some(3),
                max_age: None,
            },
            ..config()
        },
        EventBus::default(),
    );

    fill(store.as_ref(), 10);
    emitter.drain().await;

    let sent: Vec<String> = transport
        .sent()
        .iter()
        .filter_map(|p| p.get("eid").map(str::to_string))
        .collect();
    assert_eq!(sent, vec!["event-7", "event-8", "event-9"]);
}

// ── Degenerate config ────────────────────────────────────────────────

#[tokio::test]
async fn zero_emit_range_still_finishes_draining() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let emitter = Emitter::new(
        store.clone(),
        transport,
        EmitterConfig {
            emit_range: 0,
            ..config()
        },
        EventBus::default(),
    );
    assert_eq!(emitter.config().emit_range, 1);

    fill(store.as_ref(), 3);
    let report = tokio::time::timeout(Duration::from_secs(3), emitter.drain())
        .await
        .expect("drain finishes");

    assert_eq!(report.sent, 3);
    assert_eq!(count(store.as_ref()), 0);
}

#[tokio::test]
async fn empty_store_drain_returns_at_once() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let emitter = Emitter::new(store, transport.clone(), config(), EventBus::default());

    let report = tokio::time::timeout(Duration::from_secs(3), emitter.drain())
        .await
        .expect("drain finishes");

    assert_eq!(report, pulse_emitter::CycleReport::default());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn zero_interval_timer_keeps_running() {
    let store = Arc::new(MemoryEventStore::new());
    let transport = MockTransport::always(HttpMethod::Post, 200);
    let emitter = Emitter::new(
        store.clone(),
        transport,
        EmitterConfig {
            emit_interval: Duration::ZERO,
            ..config()
        },
        EventBus::default(),
    );
    assert_eq!(emitter.config().emit_interval, pulse_emitter::MIN_EMIT_INTERVAL);

    emitter.start().expect("start inside runtime");
    fill(store.as_ref(), 5);

    assert!(
        wait_until(|| count(store.as_ref()) == 0).await,
        "timer-driven drain delivers rows"
    );
    assert_eq!(emitter.status(), EmitterStatus::Running);
}
