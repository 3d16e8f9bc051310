use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// A server-assigned, strictly increasing version timestamp. It is the sole
/// ordering primitive over a concrete key's history (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vts(pub u64);

impl fmt::Display for Vts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client-assigned, monotonically non-decreasing creation timestamp:
/// `max(last_cts + 1, wallclock_millis)` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cts(pub u64);

impl fmt::Display for Cts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable record observed from the server for one concrete key at one
/// VTS. `data` is preserved verbatim; [`Value::parsed`] offers an optional
/// structured view on top without ever discarding the raw string (spec §9,
/// "Dynamic payload typing").
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub key: Key,
    pub exists: bool,
    pub data: Option<String>,
    pub acl_id: String,
    pub creator: String,
    pub cts: Cts,
    pub vts: Vts,
    pub stable: bool,
}

impl Value {
    /// Attempts to parse `data` as JSON into `T`. Returns `None` on missing
    /// data or a parse failure; the raw string on `self.data` is untouched
    /// either way.
    pub fn parsed<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        serde_json::from_str(self.data.as_ref()?).ok()
    }

    /// A tombstone is a `Value` whose `exists` flag is `false`.
    pub fn is_tombstone(&self) -> bool {
        !self.exists
    }
}
