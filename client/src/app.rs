//! The facade type applications construct directly (spec §6 "App").

use std::sync::Arc;

use vtsync_shared::Key;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::key_handle::KeyHandle;
use crate::scheduler::{AuthData, SchedulerHandle};

/// A live connection to one vtsync server. Construct with [`App::connect`],
/// obtain [`KeyHandle`]s with [`App::key`], and call [`App::authenticate`]
/// before any write or listen that depends on an identity (spec §6).
///
/// Cloning shares the same underlying scheduler task; there is no
/// `disconnect` short of dropping every clone, at which point the task
/// exits on its own (spec §4.D).
#[derive(Clone)]
pub struct App {
    scheduler: Arc<SchedulerHandle>,
}

impl App {
    /// Starts connecting immediately; the returned `App` is usable right
    /// away; operations simply queue until the transport reaches `Open`
    /// (spec §4.D, §6).
    pub fn connect(host: impl Into<String>, port: u16, use_ssl: bool) -> Self {
        let config = Arc::new(ClientConfig::new(host, port).with_ssl(use_ssl));
        Self { scheduler: SchedulerHandle::spawn(config) }
    }

    /// Same as [`App::connect`] but with full control over timeouts and
    /// the advance poll delay (spec §9's parameterization note).
    pub fn connect_with_config(config: ClientConfig) -> Self {
        Self { scheduler: SchedulerHandle::spawn(Arc::new(config)) }
    }

    /// Authenticates (or re-authenticates) the session against `provider`
    /// with `token`, resolving with the server's identity claim
    /// (spec §6).
    pub async fn authenticate(
        &self,
        provider: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<AuthData, ClientError> {
        self.scheduler.authenticate(provider.into(), token.into()).await
    }

    /// Drops the current identity and every listener registration,
    /// re-establishing an anonymous session (spec §6).
    pub async fn unauth(&self) -> Result<(), ClientError> {
        self.scheduler.unauth().await
    }

    /// Builds a handle to the key or pattern named by `path` (e.g.
    /// `"rooms.lobby.users"`, `"rooms.*.users"`, `"logs.#"`). Invalid
    /// strings don't panic or fail here; call [`KeyHandle::error`] on the
    /// result (spec §4.A, §6 "App.key()").
    pub fn key(&self, path: &str) -> KeyHandle {
        KeyHandle::new(Key::parse(path), self.scheduler.clone())
    }

    /// Builds a handle from already-split components, bypassing string
    /// parsing (spec §4.A "Key.fromComponents").
    pub fn key_from_components(&self, components: Vec<String>) -> KeyHandle {
        KeyHandle::new(Key::from_components(components), self.scheduler.clone())
    }

    /// The static ACL catalog the server recognizes, fetched live rather
    /// than hardcoded client-side (supplemental surface added beyond
    /// spec.md's original `[MODULE]` list; the catalog itself is fixed,
    /// but only the server is authoritative about what it currently
    /// accepts).
    pub async fn get_acls(&self) -> Result<Vec<String>, ClientError> {
        self.scheduler.get_acls().await
    }
}
