//! Unit tests for the state machine framework.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pulse_types::{schemas, Event, SelfDescribingJson, Structured};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{
    DeepLinkStateMachine, InspectableEvent, LifecycleStateMachine, Selector, State, StateMachine,
    StateManager, Subscriptions,
};

const CLICK: &str = "iglu:com.acme/click/jsonschema/1-0-0";

fn inspect(event: &Event) -> Arc<InspectableEvent> {
    Arc::new(InspectableEvent::new(event, Uuid::new_v4(), 1_000))
}

fn click() -> Event {
    Event::self_describing(SelfDescribingJson::new(CLICK, Map::new()))
}

#[derive(Debug)]
struct Count(u32);

impl State for Count {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn count_of(state: Option<Arc<dyn State>>) -> Option<u32> {
    state.and_then(|s| s.downcast_ref::<Count>().map(|c| c.0))
}

/// Counts every event it sees; records how many transitions actually ran.
struct Counter {
    id: &'static str,
    runs: Arc<AtomicUsize>,
}

impl Counter {
    fn new(id: &'static str) -> Self {
        Self {
            id,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl StateMachine for Counter {
    fn identifier(&self) -> &str {
        self.id
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            transitions: Selector::All,
            entities: Selector::All,
            ..Subscriptions::default()
        }
    }

    fn transition(
        &self,
        _event: &InspectableEvent,
        previous: Option<&Arc<dyn State>>,
    ) -> Option<Arc<dyn State>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let n = previous
            .and_then(|s| s.downcast_ref::<Count>())
            .map_or(0, |c| c.0);
        Some(Arc::new(Count(n + 1)))
    }

    fn entities(
        &self,
        _event: &InspectableEvent,
        state: Option<&dyn State>,
    ) -> Option<Vec<SelfDescribingJson>> {
        let n = state?.downcast_ref::<Count>()?.0;
        SelfDescribingJson::from_value("iglu:test/count/jsonschema/1-0-0", json!({"n": n}))
            .map(|e| vec![e])
    }
}

/// A different concrete kind that reuses the `Counter`'s identifier.
struct Impostor;

impl StateMachine for Impostor {
    fn identifier(&self) -> &str {
        "counter"
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions::default()
    }
}

/// Votes only on `CLICK` events.
struct Veto {
    id: &'static str,
    vote: Option<bool>,
}

impl StateMachine for Veto {
    fn identifier(&self) -> &str {
        self.id
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            filter: Selector::only([CLICK]),
            ..Subscriptions::default()
        }
    }

    fn filter(&self, _event: &InspectableEvent, _state: Option<&dyn State>) -> Option<bool> {
        self.vote
    }
}

struct Stamper {
    id: &'static str,
    values: Map<String, Value>,
}

impl StateMachine for Stamper {
    fn identifier(&self) -> &str {
        self.id
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            payload_values: Selector::All,
            ..Subscriptions::default()
        }
    }

    fn payload_values(
        &self,
        _event: &InspectableEvent,
        _state: Option<&dyn State>,
    ) -> Option<Map<String, Value>> {
        Some(self.values.clone())
    }
}

fn values(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap_or_default()
}

// ── Replacement rule ─────────────────────────────────────────────────

#[test]
fn replacing_with_same_kind_keeps_state() {
    let mut manager = StateManager::new();
    manager.add(Counter::new("counter"));

    for _ in 0..3 {
        let event = inspect(&click());
        let _ = manager.snapshot(&event).state("counter");
    }
    assert_eq!(count_of(manager.state("counter")), Some(3));

    manager.add(Counter::new("counter"));
    assert_eq!(count_of(manager.state("counter")), Some(3), "state survives replacement");

    let event = inspect(&click());
    let snapshot = manager.snapshot(&event);
    assert_eq!(count_of(snapshot.state("counter")), Some(4));
}

#[test]
fn replacing_with_different_kind_resets_state() {
    let mut manager = StateManager::new();
    manager.add(Counter::new("counter"));
    let event = inspect(&click());
    let _ = manager.snapshot(&event).state("counter");
    assert_eq!(count_of(manager.state("counter")), Some(1));

    manager.add(Impostor);
    assert!(manager.state("counter").is_none(), "different kind starts empty");

    manager.add(Counter::new("counter"));
    let event = inspect(&click());
    let snapshot = manager.snapshot(&event);
    assert_eq!(count_of(snapshot.state("counter")), Some(1), "counting restarts from empty");
}

#[test]
fn removing_machine_deletes_state() {
    let mut manager = StateManager::new();
    manager.add(Counter::new("counter"));
    let _ = manager.snapshot(&inspect(&click())).state("counter");

    assert!(manager.remove("counter"));
    assert!(!manager.contains("counter"));
    assert!(manager.state("counter").is_none());
    assert!(!manager.remove("counter"), "second removal finds nothing");
}

// ── Snapshots and laziness ───────────────────────────────────────────

#[test]
fn transitions_are_lazy_and_computed_once() {
    let mut manager = StateManager::new();
    let counter = Counter::new("counter");
    let runs = Arc::clone(&counter.runs);
    manager.add(counter);

    let event = inspect(&click());
    let snapshot = manager.snapshot(&event);
    assert_eq!(runs.load(Ordering::SeqCst), 0, "nothing computed before first read");

    let future = snapshot.future("counter").expect("future present");
    assert!(!future.is_resolved());
    let _ = snapshot.state("counter");
    let _ = snapshot.state("counter");
    let _ = manager.entities(&event, &snapshot);
    assert_eq!(runs.load(Ordering::SeqCst), 1, "computed exactly once");
}

#[test]
fn snapshot_is_stable_after_later_events() {
    let mut manager = StateManager::new();
    manager.add(Counter::new("counter"));

    let first = inspect(&click());
    let first_snapshot = manager.snapshot(&first);
    let second = inspect(&click());
    let second_snapshot = manager.snapshot(&second);

    assert_eq!(count_of(second_snapshot.state("counter")), Some(2));
    assert_eq!(count_of(first_snapshot.state("counter")), Some(1));
}

#[test]
fn long_unread_runs_resolve_without_deep_chains() {
    let mut manager = StateManager::new();
    let counter = Counter::new("counter");
    let runs = Arc::clone(&counter.runs);
    manager.add(counter);

    let mut last = None;
    for _ in 0..100_000 {
        last = Some(manager.snapshot(&inspect(&click())));
    }
    assert_eq!(
        runs.load(Ordering::SeqCst),
        99_999,
        "every link but the newest is settled as the next one is chained"
    );

    let last = last.expect("snapshot taken");
    assert_eq!(count_of(last.state("counter")), Some(100_000));
    drop(last);
    drop(manager);
}

#[test]
fn unsubscribed_events_leave_state_untouched() {
    let mut manager = StateManager::new();
    manager.add(LifecycleStateMachine);

    let bg = inspect(&Event::background(1));
    let _ = manager.snapshot(&bg).state(LifecycleStateMachine::IDENTIFIER);
    let before = manager
        .snapshot(&inspect(&click()))
        .future(LifecycleStateMachine::IDENTIFIER)
        .cloned()
        .expect("lifecycle future");

    let after = manager
        .snapshot(&inspect(&click()))
        .future(LifecycleStateMachine::IDENTIFIER)
        .cloned()
        .expect("lifecycle future");

    assert!(Arc::ptr_eq(&before, &after), "same future reused for unsubscribed events");
}

// ── Entities, payload values, filtering ──────────────────────────────

#[test]
fn entities_reflect_post_transition_state() {
    let mut manager = StateManager::new();
    manager.add(Counter::new("counter"));

    let event = inspect(&click());
    let snapshot = manager.snapshot(&event);
    let entities = manager.entities(&event, &snapshot);

    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].data.get("n"), Some(&json!(1)));
}

#[test]
fn payload_collision_keeps_original_value() {
    let mut manager = StateManager::new();
    manager.add(Stamper {
        id: "stamper",
        values: values(json!({"existing": "new", "fresh": "yes"})),
    });

    let event = inspect(&click());
    let snapshot = manager.snapshot(&event);
    let mut payload = values(json!({"existing": "old"}));

    let all_added = manager.add_payload_values(&event, &snapshot, &mut payload);

    assert!(!all_added, "collision is reported");
    assert_eq!(payload.get("existing"), Some(&json!("old")));
    assert_eq!(payload.get("fresh"), Some(&json!("yes")));
}

#[test]
fn filter_is_and_of_votes_and_accepts_without_votes() {
    let mut manager = StateManager::new();
    manager.add(Veto { id: "yes", vote: Some(true) });
    manager.add(Veto { id: "abstain", vote: None });

    let event = inspect(&click());
    let snapshot = manager.snapshot(&event);
    assert!(manager.filter(&event, &snapshot));

    manager.add(Veto { id: "no", vote: Some(false) });
    let snapshot = manager.snapshot(&event);
    assert!(!manager.filter(&event, &snapshot));

    let other = inspect(&Structured::new("c", "a").into());
    let snapshot = manager.snapshot(&other);
    assert!(
        manager.filter(&other, &snapshot),
        "machines not subscribed to this schema do not vote"
    );
}

// ── Built-in machines ────────────────────────────────────────────────

#[test]
fn lifecycle_entity_tracks_visibility() {
    let mut manager = StateManager::new();
    manager.add(LifecycleStateMachine);

    let first = inspect(&click());
    let snapshot = manager.snapshot(&first);
    let entities = manager.entities(&first, &snapshot);
    assert_eq!(entities[0].schema, schemas::APPLICATION_LIFECYCLE);
    assert_eq!(entities[0].data.get("isVisible"), Some(&json!(true)));

    let bg = inspect(&Event::background(2));
    let snapshot = manager.snapshot(&bg);
    let entities = manager.entities(&bg, &snapshot);
    assert_eq!(entities[0].data.get("isVisible"), Some(&json!(false)));
    assert_eq!(entities[0].data.get("index"), Some(&json!(2)));
}

#[test]
fn deep_link_attaches_to_next_screen_view_only() {
    let mut manager = StateManager::new();
    manager.add(DeepLinkStateMachine);

    let link = inspect(&Event::deep_link_received(
        "app://promo",
        Some("https://ref.example".to_string()),
    ));
    let snapshot = manager.snapshot(&link);
    assert!(manager.entities(&link, &snapshot).is_empty());

    let screen = inspect(&Event::screen_view("home", Uuid::new_v4()));
    let snapshot = manager.snapshot(&screen);
    let entities = manager.entities(&screen, &snapshot);
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].schema, schemas::DEEP_LINK_ENTITY);
    assert_eq!(entities[0].str_field("url"), Some("app://promo"));
    assert_eq!(entities[0].str_field("referrer"), Some("https://ref.example"));

    let next = inspect(&Event::screen_view("detail", Uuid::new_v4()));
    let snapshot = manager.snapshot(&next);
    assert!(manager.entities(&next, &snapshot).is_empty());
}
