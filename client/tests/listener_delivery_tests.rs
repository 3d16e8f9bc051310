//! End-to-end scenarios from a single logical execution context's point of
//! view: values applied to a plain listener, the way spec.md's example
//! session traces exercise pattern matching and delivery order. Exercised
//! against the public `ValueListener`/`Key` surface only; the scheduler's
//! VTS-dedup bookkeeping (`Registration::should_deliver`) is covered by
//! its own unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vtsync_client::{FnListener, ValueListener};
use vtsync_shared::value::{Cts, Vts};
use vtsync_shared::{Acl, Key, Value};

fn value(key: &str, vts: u64, exists: bool, acl: Acl) -> Value {
    Value {
        key: Key::parse(key).unwrap(),
        exists,
        data: Some(format!("\"{key}@{vts}\"")),
        acl_id: acl.as_str().to_string(),
        creator: "u1".to_string(),
        cts: Cts(vts),
        vts: Vts(vts),
        stable: true,
    }
}

/// Minimal stand-in for the scheduler's per-registration dedup: at most
/// once per distinct VTS, never out of order (spec §3 "Listener
/// Registration"). Mirrors `Registration::should_deliver`'s contract so
/// these tests exercise the same invariant end to end without reaching
/// into the crate's private scheduler state.
fn should_deliver(highest: &mut HashMap<String, Vts>, key_str: &str, vts: Vts) -> bool {
    let should = match highest.get(key_str) {
        Some(existing) => vts > *existing,
        None => true,
    };
    if should {
        highest.insert(key_str.to_string(), vts);
    }
    should
}

struct Counting {
    values: std::sync::Mutex<Vec<Value>>,
}

impl Counting {
    fn new() -> Arc<Self> {
        Arc::new(Self { values: std::sync::Mutex::new(Vec::new()) })
    }

    fn seen(&self) -> Vec<Value> {
        self.values.lock().unwrap().clone()
    }
}

impl ValueListener for Counting {
    fn on_value(&self, value: Value) {
        self.values.lock().unwrap().push(value);
    }
}

#[test]
fn a_listener_registered_before_a_write_sees_it_once() {
    let pattern = Key::parse("rooms.lobby.#").unwrap();
    let listener = Counting::new();
    let mut highest = HashMap::new();

    let v = value("rooms.lobby.users", 10, true, Acl::PublicReadWrite);
    assert!(pattern.matches(&v.key));
    assert!(should_deliver(&mut highest, &v.key.to_string(), v.vts));
    listener.on_value(v.clone());

    assert_eq!(listener.seen().len(), 1);
    assert_eq!(listener.seen()[0].vts, Vts(10));
}

#[test]
fn deleting_a_key_delivers_a_tombstone_with_a_higher_vts() {
    let pattern = Key::parse("docs.*").unwrap();
    let listener = Counting::new();
    let mut highest = HashMap::new();

    let created = value("docs.readme", 1, true, Acl::PublicReadWrite);
    assert!(pattern.matches(&created.key));
    assert!(should_deliver(&mut highest, &created.key.to_string(), created.vts));
    listener.on_value(created);

    let mut deleted = value("docs.readme", 2, false, Acl::PublicReadWrite);
    deleted.data = None;
    assert!(should_deliver(&mut highest, &deleted.key.to_string(), deleted.vts));
    listener.on_value(deleted);

    let seen = listener.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].is_tombstone());
}

#[test]
fn repeated_writes_to_one_key_are_delivered_in_strictly_increasing_vts_order() {
    let listener = Counting::new();
    let mut highest = HashMap::new();

    for vts in [1u64, 2, 2, 5, 4, 6] {
        let v = value("counters.hits", vts, true, Acl::PublicReadWrite);
        if should_deliver(&mut highest, &v.key.to_string(), v.vts) {
            listener.on_value(v);
        }
    }

    let seen = listener.seen();
    let vts_seen: Vec<u64> = seen.iter().map(|v| v.vts.0).collect();
    assert_eq!(vts_seen, vec![1, 2, 5, 6]);
}

#[test]
fn a_wildcard_listener_observes_writes_under_any_matching_child() {
    let pattern = Key::parse("teams.*.score").unwrap();
    let listener = Counting::new();
    let mut highest = HashMap::new();

    for (team, vts) in [("red", 1u64), ("blue", 2), ("red", 3)] {
        let v = value(&format!("teams.{team}.score"), vts, true, Acl::PublicReadWrite);
        if pattern.matches(&v.key) && should_deliver(&mut highest, &v.key.to_string(), v.vts) {
            listener.on_value(v);
        }
    }

    assert_eq!(listener.seen().len(), 3);
}

#[test]
fn a_tail_wildcard_listener_does_not_see_keys_outside_its_subtree() {
    let pattern = Key::parse("logs.#").unwrap();
    assert!(pattern.matches(&Key::parse("logs.app.error").unwrap()));
    assert!(!pattern.matches(&Key::parse("metrics.app.error").unwrap()));
}

#[test]
fn concurrent_writes_to_distinct_keys_under_one_tail_listener_are_all_delivered() {
    let pattern = Key::parse("events.#").unwrap();
    let listener = Counting::new();
    let mut highest = HashMap::new();

    let writes = [
        ("events.login", 1u64),
        ("events.logout", 2),
        ("events.purchase.item42", 3),
    ];
    for (key, vts) in writes {
        let v = value(key, vts, true, Acl::PublicCreate);
        if pattern.matches(&v.key) && should_deliver(&mut highest, &v.key.to_string(), v.vts) {
            listener.on_value(v);
        }
    }

    assert_eq!(listener.seen().len(), 3);
}

#[test]
fn fn_listener_adapter_forwards_values_without_an_on_error_hook() {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = counter.clone();
    let listener = FnListener(move |_value: Value| {
        counter_clone.fetch_add(1, Ordering::SeqCst);
    });
    listener.on_value(value("a.b", 1, true, Acl::Private));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
