use std::collections::{HashMap, HashSet};

use vtsync_shared::value::Vts;
use vtsync_shared::Value;

/// Process-wide synchronization state (spec §3 "Sync State", component G).
/// Owned exclusively by the scheduler loop; nothing else mutates it.
#[derive(Default)]
pub struct SyncState {
    /// Concrete key string -> latest observed Value.
    memory_db: HashMap<String, Value>,
    /// VTS -> concrete key string, for Advance's "already known" check.
    vts_index: HashMap<u64, String>,
    /// Pattern string -> highest committed RVTS for that subscription.
    rvts_dict: HashMap<String, Vts>,
    /// Pattern strings currently driving an advance loop.
    advance_scheduled: HashSet<String>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an incoming Value if it is newer than what we have for its
    /// key. Returns `true` if the store was updated (and thus listeners
    /// should be considered), `false` if it was dropped as stale
    /// (spec §3 invariants, §4.F "deliverToListeners").
    pub fn apply(&mut self, value: Value) -> bool {
        let key_str = value.key.to_string();
        if let Some(existing) = self.memory_db.get(&key_str) {
            if value.vts <= existing.vts {
                return false;
            }
        }
        self.vts_index.insert(value.vts.0, key_str.clone());
        self.memory_db.insert(key_str, value);
        true
    }

    pub fn get(&self, key_str: &str) -> Option<&Value> {
        self.memory_db.get(key_str)
    }

    /// Every `exists=true` value currently cached, for priming a new
    /// listener (spec §4.F "addListener").
    pub fn all_live_values(&self) -> impl Iterator<Item = &Value> {
        self.memory_db.values().filter(|v| v.exists)
    }

    /// Looks up the cached Value for a VTS Advance reported as already
    /// known, per spec §4.E's Advance handling.
    pub fn value_for_vts(&self, vts: Vts) -> Option<&Value> {
        let key_str = self.vts_index.get(&vts.0)?;
        self.memory_db.get(key_str)
    }

    pub fn rvts(&self, pattern: &str) -> Vts {
        self.rvts_dict.get(pattern).copied().unwrap_or(Vts(0))
    }

    pub fn commit_rvts(&mut self, pattern: &str, rvts: Vts) {
        self.rvts_dict.insert(pattern.to_string(), rvts);
    }

    pub fn is_advance_scheduled(&self, pattern: &str) -> bool {
        self.advance_scheduled.contains(pattern)
    }

    pub fn set_advance_scheduled(&mut self, pattern: &str) {
        self.advance_scheduled.insert(pattern.to_string());
    }

    pub fn clear_advance_scheduled(&mut self, pattern: &str) {
        self.advance_scheduled.remove(pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtsync_shared::value::Cts;
    use vtsync_shared::Key;

    fn value(key: &str, vts: u64, exists: bool) -> Value {
        Value {
            key: Key::parse(key).unwrap(),
            exists,
            data: Some("x".to_string()),
            acl_id: "$publicCreate".to_string(),
            creator: "u1".to_string(),
            cts: Cts(vts),
            vts: Vts(vts),
            stable: true,
        }
    }

    #[test]
    fn newer_vts_replaces_older() {
        let mut state = SyncState::new();
        assert!(state.apply(value("a.b", 1, true)));
        assert!(state.apply(value("a.b", 2, true)));
        assert_eq!(state.get("a.b").unwrap().vts, Vts(2));
    }

    #[test]
    fn stale_vts_is_dropped() {
        let mut state = SyncState::new();
        assert!(state.apply(value("a.b", 5, true)));
        assert!(!state.apply(value("a.b", 3, true)));
        assert_eq!(state.get("a.b").unwrap().vts, Vts(5));
    }

    #[test]
    fn equal_vts_is_dropped_not_reapplied() {
        let mut state = SyncState::new();
        assert!(state.apply(value("a.b", 5, true)));
        assert!(!state.apply(value("a.b", 5, false)));
        assert!(state.get("a.b").unwrap().exists);
    }

    #[test]
    fn tombstone_supersedes_only_with_strictly_greater_vts() {
        let mut state = SyncState::new();
        assert!(state.apply(value("a.b", 1, true)));
        assert!(state.apply(value("a.b", 2, false)));
        assert!(!state.get("a.b").unwrap().exists);
    }

    #[test]
    fn vts_index_tracks_the_owning_key() {
        let mut state = SyncState::new();
        state.apply(value("a.b", 9, true));
        assert_eq!(state.value_for_vts(Vts(9)).unwrap().key.to_string(), "a.b");
        assert_eq!(state.value_for_vts(Vts(10)), None);
    }

    #[test]
    fn rvts_defaults_to_zero_and_is_committed() {
        let mut state = SyncState::new();
        assert_eq!(state.rvts("foo.*"), Vts(0));
        state.commit_rvts("foo.*", Vts(42));
        assert_eq!(state.rvts("foo.*"), Vts(42));
    }

    #[test]
    fn advance_scheduled_flag_round_trips() {
        let mut state = SyncState::new();
        assert!(!state.is_advance_scheduled("foo.*"));
        state.set_advance_scheduled("foo.*");
        assert!(state.is_advance_scheduled("foo.*"));
        state.clear_advance_scheduled("foo.*");
        assert!(!state.is_advance_scheduled("foo.*"));
    }
}
