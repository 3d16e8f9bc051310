use std::collections::HashMap;
use std::sync::Arc;

use vtsync_shared::value::Vts;
use vtsync_shared::{Key, Value};

use crate::error::ClientError;

/// A listener is modeled as a capability rather than a bare closure, per
/// spec §9's design note: an object providing `on_value`/`on_error`.
/// Dispatch always happens on a freshly spawned task (spec §5) so a
/// listener can never reenter scheduler state.
pub trait ValueListener: Send + Sync {
    fn on_value(&self, value: Value);

    /// Invoked only for key-validity failures at registration time (spec
    /// §7); server-side subscribe errors are logged, not delivered here.
    fn on_error(&self, error: ClientError) {
        log::warn!(target: "vtsync_client::response", "listener error: {error}");
    }
}

/// Adapts a plain closure to [`ValueListener`] for callers who don't need
/// an `on_error` hook.
pub struct FnListener<F: Fn(Value) + Send + Sync>(pub F);

impl<F: Fn(Value) + Send + Sync> ValueListener for FnListener<F> {
    fn on_value(&self, value: Value) {
        (self.0)(value)
    }
}

/// One user-registered listener: a pattern, a callback, and the highest
/// VTS delivered per concrete key it has matched (spec §3 "Listener
/// Registration").
pub(crate) struct Registration {
    pub id: u64,
    pub pattern: Key,
    pub callback: Arc<dyn ValueListener>,
    pub highest_delivered: HashMap<String, Vts>,
}

impl Registration {
    pub fn new(id: u64, pattern: Key, callback: Arc<dyn ValueListener>) -> Self {
        Self {
            id,
            pattern,
            callback,
            highest_delivered: HashMap::new(),
        }
    }

    /// Returns `true` and records `vts` if this registration has not yet
    /// delivered `vts` or higher for `key_str` (spec §3 "at most once per
    /// distinct VTS, always in non-decreasing VTS order").
    pub fn should_deliver(&mut self, key_str: &str, vts: Vts) -> bool {
        let should = match self.highest_delivered.get(key_str) {
            Some(highest) => vts > *highest,
            None => true,
        };
        if should {
            self.highest_delivered.insert(key_str.to_string(), vts);
        }
        should
    }

    /// Clears delivery history for a freshly (re-)registered listener so
    /// the initial snapshot is delivered in full (spec §4.F "addListener").
    pub fn reset_delivery_history(&mut self) {
        self.highest_delivered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration::new(1, Key::parse("foo.*").unwrap(), Arc::new(FnListener(|_| {})))
    }

    #[test]
    fn first_delivery_for_a_key_always_goes_through() {
        let mut reg = registration();
        assert!(reg.should_deliver("foo.bar", Vts(5)));
    }

    #[test]
    fn strictly_higher_vts_goes_through_equal_or_lower_does_not() {
        let mut reg = registration();
        assert!(reg.should_deliver("foo.bar", Vts(5)));
        assert!(!reg.should_deliver("foo.bar", Vts(5)));
        assert!(!reg.should_deliver("foo.bar", Vts(4)));
        assert!(reg.should_deliver("foo.bar", Vts(6)));
    }

    #[test]
    fn reset_allows_redelivery_of_a_previously_seen_vts() {
        let mut reg = registration();
        reg.should_deliver("foo.bar", Vts(5));
        reg.reset_delivery_history();
        assert!(reg.should_deliver("foo.bar", Vts(5)));
    }

    #[test]
    fn independent_keys_track_independently() {
        let mut reg = registration();
        assert!(reg.should_deliver("foo.bar", Vts(5)));
        assert!(reg.should_deliver("foo.baz", Vts(1)));
    }
}
