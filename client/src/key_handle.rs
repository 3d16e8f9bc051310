use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;

use vtsync_shared::{Acl, Key};

use crate::error::ClientError;
use crate::listener::{FnListener, ValueListener};
use crate::scheduler::SchedulerHandle;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_listener_id() -> u64 {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Either a raw string (sent verbatim) or a structured JSON value
/// (serialized by the core before sending). Matches the two accepted
/// shapes of `Key.write`'s `data` argument (spec §6).
pub enum WriteInput {
    Raw(String),
    Json(JsonValue),
}

impl From<&str> for WriteInput {
    fn from(s: &str) -> Self {
        WriteInput::Raw(s.to_string())
    }
}

impl From<String> for WriteInput {
    fn from(s: String) -> Self {
        WriteInput::Raw(s)
    }
}

impl From<JsonValue> for WriteInput {
    fn from(v: JsonValue) -> Self {
        WriteInput::Json(v)
    }
}

impl WriteInput {
    /// Resolves to the raw wire string, or an `InvalidRequest` if `data`
    /// was a non-string, non-object primitive (spec §4.F, §7).
    pub(crate) fn resolve(self) -> Result<String, ClientError> {
        match self {
            WriteInput::Raw(s) => Ok(s),
            WriteInput::Json(JsonValue::String(s)) => Ok(s),
            WriteInput::Json(v @ JsonValue::Object(_)) => Ok(v.to_string()),
            WriteInput::Json(_) => Err(ClientError::InvalidRequest(
                "data must be a string or a structured (object) value".to_string(),
            )),
        }
    }
}

/// Options accepted by [`KeyHandle::write`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub acl: Option<Acl>,
}

/// The public handle to a [`Key`]: a value object plus the capability to
/// write/delete/listen against it through the owning [`crate::app::App`]
/// (spec §6). Carries an application-scoped unique id so that two
/// `KeyHandle`s built from the same pattern string register as distinct
/// listeners (spec §3 "Key").
#[derive(Clone)]
pub struct KeyHandle {
    key: Result<Key, vtsync_shared::InvalidKey>,
    id: u64,
    scheduler: Arc<SchedulerHandle>,
}

impl KeyHandle {
    pub(crate) fn new(
        key: Result<Key, vtsync_shared::InvalidKey>,
        scheduler: Arc<SchedulerHandle>,
    ) -> Self {
        Self { key, id: next_listener_id(), scheduler }
    }

    /// `None` if this handle's key string failed validation at
    /// construction time (spec §4.A, §8 "K.error() = null").
    pub fn error(&self) -> Option<&vtsync_shared::InvalidKey> {
        self.key.as_ref().err()
    }

    pub fn is_key_pattern(&self) -> bool {
        self.key.as_ref().map(Key::is_pattern).unwrap_or(false)
    }

    pub fn last_component(&self) -> Option<String> {
        self.key.as_ref().ok()?.last_component().map(str::to_string)
    }

    pub fn parent(&self) -> KeyHandle {
        let key = self.key.clone().map(|k| k.parent());
        KeyHandle { key, id: next_listener_id(), scheduler: self.scheduler.clone() }
    }

    /// Appends `name`, or a fresh generated identifier when `name` is
    /// `None`. The result's validity is not pre-checked (spec §4.A
    /// "child()"): call [`KeyHandle::error`] to find out.
    pub fn child(&self, name: Option<&str>) -> KeyHandle {
        let key = self.key.clone().map(|k| match name {
            Some(n) => k.child(n),
            None => k.child(uuid::Uuid::new_v4().to_string()),
        });
        KeyHandle { key, id: next_listener_id(), scheduler: self.scheduler.clone() }
    }

    fn require_key(&self) -> Result<&Key, ClientError> {
        self.key.as_ref().map_err(|e| ClientError::from(e.clone()))
    }

    /// Writes `data` to this (concrete) key. Returns `InvalidKey` if the
    /// key is invalid, `InvalidRequest` if it is a pattern or `data` is a
    /// bad shape, otherwise resolves when the server acks (spec §6).
    pub async fn write(
        &self,
        data: impl Into<WriteInput>,
        opts: WriteOptions,
    ) -> Result<(), ClientError> {
        let key = self.require_key()?;
        if key.is_pattern() {
            return Err(ClientError::InvalidRequest(
                "write requires a concrete key".to_string(),
            ));
        }
        let data = data.into().resolve()?;
        self.scheduler
            .publish(key.clone(), Some(data), false, opts.acl)
            .await
    }

    /// Deletes this key. Unlike `write`, wildcards are permitted; the
    /// server is the authority on access (spec §6).
    pub async fn delete(&self) -> Result<(), ClientError> {
        let key = self.require_key()?;
        self.scheduler.publish(key.clone(), None, true, None).await
    }

    /// Registers `listener`. At most one listener is tracked per
    /// `KeyHandle` instance; re-registration replaces the previous one
    /// (spec §6).
    pub async fn listen(&self, listener: Arc<dyn ValueListener>) {
        match &self.key {
            Ok(key) => self.scheduler.listen(key.clone(), self.id, listener).await,
            Err(e) => listener.on_error(ClientError::from(e.clone())),
        }
    }

    /// Convenience over [`KeyHandle::listen`] for callers who only need
    /// `on_value`.
    pub async fn listen_fn<F: Fn(vtsync_shared::Value) + Send + Sync + 'static>(&self, f: F) {
        self.listen(Arc::new(FnListener(f))).await;
    }

    pub async fn unlisten(&self) {
        if let Ok(key) = &self.key {
            self.scheduler.unlisten(key.clone(), self.id).await;
        }
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Ok(k) => write!(f, "KeyHandle(\"{k}\", id={})", self.id),
            Err(_) => write!(f, "KeyHandle(<invalid>, id={})", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_string_input_resolves_verbatim() {
        let input: WriteInput = "hello".into();
        assert_eq!(input.resolve().unwrap(), "hello");
    }

    #[test]
    fn json_object_input_serializes_to_text() {
        let input: WriteInput = serde_json::json!({"v": 1}).into();
        assert_eq!(input.resolve().unwrap(), r#"{"v":1}"#);
    }

    #[test]
    fn json_string_input_is_treated_as_raw() {
        let input: WriteInput = serde_json::Value::String("before".to_string()).into();
        assert_eq!(input.resolve().unwrap(), "before");
    }

    #[test]
    fn non_string_non_object_primitive_is_rejected() {
        let input: WriteInput = serde_json::json!(42).into();
        let err = input.resolve().unwrap_err();
        assert_eq!(err.error_code(), 3);
    }

    #[test]
    fn array_primitive_is_also_rejected() {
        let input: WriteInput = serde_json::json!([1, 2]).into();
        assert!(input.resolve().is_err());
    }
}
