//! The single task that owns every piece of mutable client state: the
//! operation queue, the sync state cache, the listener table, and the
//! transport. Every public entry point is a message sent over an `mpsc`
//! channel and answered (where it has a result) over a `oneshot`; nothing
//! outside this module ever touches [`SyncState`], [`Transport`], or the
//! listener table directly. This is what makes "one logical execution
//! context" true by construction rather than by discipline (spec §5).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use vtsync_shared::protocol::{
    AdvancePayload, Envelope, EmptyPayload, FetchPayload, PathPayload, PublishPayload,
    ResponseKind,
};
use vtsync_shared::value::{Cts, Vts};
use vtsync_shared::{Acl, Key, Value};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::listener::{Registration, ValueListener};
use crate::operation::{Operation, Signature, Stage, Variant};
use crate::sync_state::SyncState;
use crate::transport::{Transport, TransportEvent};

const OP_TARGET: &str = "vtsync_client::operation";
const FACADE_TARGET: &str = "vtsync_client::facade";

/// What `authenticate` resolves to: the server's view of who we are, plus
/// the credentials that produced it (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    pub uid: String,
    pub provider: String,
    pub token: String,
    pub expires: u64,
}

enum Command {
    Authenticate {
        provider: String,
        token: String,
        respond: oneshot::Sender<Result<AuthData, ClientError>>,
    },
    Unauth {
        respond: oneshot::Sender<Result<(), ClientError>>,
    },
    Publish {
        key: Key,
        data: Option<String>,
        delete_path: bool,
        acl: Option<Acl>,
        respond: oneshot::Sender<Result<(), ClientError>>,
    },
    GetAcls {
        respond: oneshot::Sender<Result<Vec<String>, ClientError>>,
    },
    Listen {
        key: Key,
        id: u64,
        callback: Arc<dyn ValueListener>,
    },
    Unlisten {
        key: Key,
        id: u64,
    },
}

/// The cloneable, `Send + Sync` front door to the scheduler task. `App` and
/// `KeyHandle` hold this; none of them ever see the scheduler's internals.
pub struct SchedulerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub(crate) fn spawn(config: Arc<ClientConfig>) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(config, cmd_rx);
        tokio::spawn(scheduler.run());
        Arc::new(Self { cmd_tx })
    }

    pub async fn authenticate(&self, provider: String, token: String) -> Result<AuthData, ClientError> {
        self.call(|respond| Command::Authenticate { provider, token, respond }).await
    }

    pub async fn unauth(&self) -> Result<(), ClientError> {
        self.call(|respond| Command::Unauth { respond }).await
    }

    pub async fn publish(
        &self,
        key: Key,
        data: Option<String>,
        delete_path: bool,
        acl: Option<Acl>,
    ) -> Result<(), ClientError> {
        self.call(|respond| Command::Publish { key, data, delete_path, acl, respond }).await
    }

    pub async fn get_acls(&self) -> Result<Vec<String>, ClientError> {
        self.call(|respond| Command::GetAcls { respond }).await
    }

    pub async fn listen(&self, key: Key, id: u64, callback: Arc<dyn ValueListener>) {
        let _ = self.cmd_tx.send(Command::Listen { key, id, callback });
    }

    pub async fn unlisten(&self, key: Key, id: u64) {
        let _ = self.cmd_tx.send(Command::Unlisten { key, id });
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, ClientError>>) -> Command,
    ) -> Result<T, ClientError> {
        let (respond, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(respond))
            .map_err(|_| ClientError::Internal("scheduler task is gone".to_string()))?;
        rx.await
            .map_err(|_| ClientError::Internal("scheduler task dropped the response".to_string()))?
    }
}

/// Maps a finished request's response to the plain ack/err shape that
/// `Publish`, `Subscribe`, and `Unsubscribe` all resolve with (spec §4.E).
fn happy_or_error(response: ResponseKind) -> Result<(), ClientError> {
    match response {
        ResponseKind::Happy(h) if h.code == 0 => Ok(()),
        ResponseKind::Happy(h) => Err(ClientError::RequestError { code: h.code, message: h.msg }),
        ResponseKind::Error(e) => Err(ClientError::RequestError { code: -1, message: e.msg }),
        other => Err(ClientError::Internal(format!(
            "server sent an unexpected response shape: {other:?}"
        ))),
    }
}

fn has_signature_conflict(pending: &HashMap<String, Operation>, signature: &Signature) -> bool {
    pending.values().any(|op| &op.signature() == signature)
}

struct Scheduler {
    config: Arc<ClientConfig>,
    transport: Transport,
    sync_state: SyncState,
    queue: VecDeque<Operation>,
    /// Started operations awaiting a response, keyed by the closure id we
    /// sent them with.
    pending: HashMap<String, Operation>,
    listeners: Vec<Registration>,
    next_operation_id: u64,
    next_closure_id: u64,
    last_cts: u64,
    auth: Option<(String, String)>,
    pending_auth_respond: Option<oneshot::Sender<Result<AuthData, ClientError>>>,
    /// Patterns whose next advance round is delayed rather than immediate
    /// (spec §4.E, "5-second delay" before re-polling a quiet pattern).
    advance_due: HashMap<String, Instant>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl Scheduler {
    fn new(config: Arc<ClientConfig>, cmd_rx: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            transport: Transport::new(config.clone()),
            config,
            sync_state: SyncState::new(),
            queue: VecDeque::new(),
            pending: HashMap::new(),
            listeners: Vec::new(),
            next_operation_id: 1,
            next_closure_id: 1,
            last_cts: 0,
            auth: None,
            pending_auth_respond: None,
            advance_due: HashMap::new(),
            cmd_rx,
        }
    }

    async fn run(mut self) {
        self.transport.ensure_connecting(None);
        let mut tick = tokio::time::interval(self.config.scheduler_tick_interval);
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            log::debug!(target: FACADE_TARGET, "all handles dropped, shutting down");
                            return;
                        }
                    }
                }
                event = self.transport.next_event() => self.handle_transport_event(event).await,
                _ = tick.tick() => self.handle_tick().await,
            }
            self.try_start_ready_operations().await;
        }
    }

    fn next_operation_id(&mut self) -> u64 {
        let id = self.next_operation_id;
        self.next_operation_id += 1;
        id
    }

    fn next_cts(&mut self) -> Cts {
        let wallclock = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let next = (self.last_cts + 1).max(wallclock);
        self.last_cts = next;
        Cts(next)
    }

    fn enqueue(&mut self, operation: Operation) {
        self.queue.push_back(operation);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Authenticate { provider, token, respond } => {
                self.auth = Some((provider.clone(), token.clone()));
                self.pending_auth_respond = Some(respond);
                self.transport.end_session().await;
                self.transport.ensure_connecting(Some((provider, token)));
            }
            Command::Unauth { respond } => {
                self.auth = None;
                self.remove_all_listeners();
                self.transport.end_session().await;
                let _ = respond.send(Ok(()));
            }
            Command::Publish { key, data, delete_path, acl, respond } => {
                let cts = self.next_cts();
                let acl_id = acl.map(|a| a.as_str().to_string());
                let id = self.next_operation_id();
                self.enqueue(Operation::new(
                    id,
                    Variant::Publish { key, data, delete_path, acl_id, cts, done: respond },
                ));
            }
            Command::GetAcls { respond } => {
                let id = self.next_operation_id();
                self.enqueue(Operation::new(id, Variant::GetAcls { done: respond }));
            }
            Command::Listen { key, id, callback } => self.handle_listen(key, id, callback),
            Command::Unlisten { key, id } => self.handle_unlisten(key, id),
        }
    }

    /// Registers a listener, delivers whatever cached live values already
    /// match it, and subscribes on the wire the first time this pattern is
    /// observed (spec §4.F "addListener"). Deduplicates against the
    /// existing table by listener id: re-registering the same id (e.g. a
    /// second `listen()` call on one `KeyHandle`, or a clone of it)
    /// replaces the prior registration rather than delivering twice
    /// (spec §4.F, §6 "re-registration replaces").
    fn handle_listen(&mut self, key: Key, id: u64, callback: Arc<dyn ValueListener>) {
        let pattern_str = key.to_string();
        let first_for_pattern =
            !self.listeners.iter().any(|r| r.pattern.to_string() == pattern_str);

        let mut registration = Registration::new(id, key.clone(), callback.clone());
        for value in self.sync_state.all_live_values() {
            if key.matches(&value.key) && registration.should_deliver(&value.key.to_string(), value.vts) {
                spawn_delivery(callback.clone(), value.clone());
            }
        }
        self.listeners.retain(|r| r.id != id);
        self.listeners.push(registration);

        if first_for_pattern {
            let (done, done_rx) = oneshot::channel();
            let op_id = self.next_operation_id();
            self.enqueue(Operation::new(op_id, Variant::Subscribe { key, done }));
            tokio::spawn(async move {
                match done_rx.await {
                    Ok(Err(e)) => log::warn!(target: OP_TARGET, "subscribe failed: {e}"),
                    Err(_) => log::warn!(target: OP_TARGET, "subscribe response lost"),
                    Ok(Ok(())) => {}
                }
            });
        }
    }

    /// Drops one registration; unsubscribes on the wire once nothing else
    /// is listening on the same pattern string (spec §4.F "removeListener").
    fn handle_unlisten(&mut self, key: Key, id: u64) {
        let pattern_str = key.to_string();
        self.listeners.retain(|r| r.id != id);
        let still_present = self.listeners.iter().any(|r| r.pattern.to_string() == pattern_str);
        if still_present {
            return;
        }
        self.sync_state.clear_advance_scheduled(&pattern_str);
        self.advance_due.remove(&pattern_str);
        let (done, done_rx) = oneshot::channel();
        let op_id = self.next_operation_id();
        self.enqueue(Operation::new(op_id, Variant::Unsubscribe { key, done }));
        tokio::spawn(async move {
            match done_rx.await {
                Ok(Err(e)) => log::warn!(target: OP_TARGET, "unsubscribe failed: {e}"),
                Err(_) => log::warn!(target: OP_TARGET, "unsubscribe response lost"),
                Ok(Ok(())) => {}
            }
        });
    }

    /// Tears down every listener registration without notifying callbacks;
    /// snapshots the table before iterating so dropping a registration's
    /// `Arc` mid-loop can never observe a partially-cleared table
    /// (resolves spec.md's open question on `unauth` teardown order).
    fn remove_all_listeners(&mut self) {
        let registrations = std::mem::take(&mut self.listeners);
        for registration in registrations {
            let pattern_str = registration.pattern.to_string();
            self.sync_state.clear_advance_scheduled(&pattern_str);
            self.advance_due.remove(&pattern_str);
        }
    }

    fn deliver_to_listeners(&mut self, value: &Value) {
        let key_str = value.key.to_string();
        for registration in self.listeners.iter_mut() {
            if registration.pattern.matches(&value.key) && registration.should_deliver(&key_str, value.vts) {
                spawn_delivery(registration.callback.clone(), value.clone());
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Envelope(envelope) => self.handle_envelope(envelope).await,
            TransportEvent::Closed => {
                self.transport.ensure_connecting(self.auth.clone());
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        let response = match ResponseKind::from_envelope(&envelope) {
            Ok(response) => response,
            Err(e) => {
                log::warn!(target: "vtsync_client::response", "{e}");
                return;
            }
        };

        if let ResponseKind::Connect(payload) = &response {
            if let Some(respond) = self.pending_auth_respond.take() {
                let (provider, token) = self.auth.clone().unwrap_or_default();
                let _ = respond.send(Ok(AuthData {
                    uid: payload.uid.clone(),
                    provider,
                    token,
                    expires: payload.expires,
                }));
            }
            log::info!(target: FACADE_TARGET, "session established, uid={}", payload.uid);
            return;
        }

        // An unsolicited push, independent of the advance/fetch poll loop
        // (spec §4.C "data"): apply and fan out like any other value.
        if let ResponseKind::Data(value_payload) = &response {
            let Ok(key) = Key::from_components(value_payload.path.clone()) else {
                log::warn!(target: "vtsync_client::response", "pushed data had an unparseable path, dropping");
                return;
            };
            let value = Value {
                key,
                exists: value_payload.exists,
                data: value_payload.data.clone(),
                acl_id: value_payload.acl_id.clone(),
                creator: value_payload.creator.clone(),
                cts: value_payload.cts(),
                vts: value_payload.vts(),
                stable: value_payload.stable,
            };
            if self.sync_state.apply(value.clone()) {
                self.deliver_to_listeners(&value);
            }
            return;
        }

        let Some(closure) = envelope.closure else {
            log::warn!(target: "vtsync_client::response", "response carried no closure, dropping");
            return;
        };
        let Some(operation) = self.pending.remove(&closure) else {
            log::debug!(target: "vtsync_client::response", "response for unknown closure {closure}, dropping");
            return;
        };
        self.finish_operation(operation, response);
    }

    fn finish_operation(&mut self, mut operation: Operation, response: ResponseKind) {
        operation.stage = Stage::Finished;
        match operation.variant {
            Variant::Publish { done, .. } => {
                let _ = done.send(happy_or_error(response));
            }
            Variant::Subscribe { done, key } => {
                let result = happy_or_error(response);
                if result.is_ok() {
                    self.start_advance(key);
                }
                let _ = done.send(result);
            }
            Variant::Unsubscribe { done, .. } => {
                let _ = done.send(happy_or_error(response));
            }
            Variant::GetAcls { done } => {
                let result = match response {
                    ResponseKind::GetAcls(payload) => Ok(payload.acls),
                    ResponseKind::Error(e) => Err(ClientError::RequestError { code: -1, message: e.msg }),
                    other => Err(ClientError::Internal(format!(
                        "server sent an unexpected response shape: {other:?}"
                    ))),
                };
                let _ = done.send(result);
            }
            Variant::Advance { pattern, .. } => self.handle_advance_response(pattern, response),
            Variant::Fetch { pattern, rvts_prime, .. } => {
                self.handle_fetch_response(pattern, rvts_prime, response)
            }
        }
    }

    /// Starts the repeating advance loop for a freshly-subscribed pattern
    /// (spec §4.E). A no-op if one is already running for this pattern
    /// string (e.g. a second `KeyHandle` listening on the same pattern).
    fn start_advance(&mut self, pattern: Key) {
        let pattern_str = pattern.to_string();
        if self.sync_state.is_advance_scheduled(&pattern_str) {
            return;
        }
        self.sync_state.set_advance_scheduled(&pattern_str);
        let rvts = self.sync_state.rvts(&pattern_str);
        let op_id = self.next_operation_id();
        self.enqueue(Operation::new(op_id, Variant::Advance { pattern, rvts: Some(rvts) }));
    }

    /// An advance response lists VTS values newer than our RVTS. Whatever
    /// is already cached (e.g. from another pattern's fetch) is delivered
    /// straight away; the rest is fetched in bulk (spec §4.E).
    fn handle_advance_response(&mut self, pattern: Key, response: ResponseKind) {
        let pattern_str = pattern.to_string();
        match response {
            ResponseKind::Advance(payload) => {
                let mut missing = Vec::new();
                for raw in &payload.vts {
                    let vts = Vts(*raw);
                    if let Some(value) = self.sync_state.value_for_vts(vts).cloned() {
                        self.deliver_to_listeners(&value);
                    } else {
                        missing.push(vts);
                    }
                }
                // rvtsPrime = maxvts if the server sent one, else
                // max(current rvts, max(returned vts)) — never just the
                // current rvts, or a maxvts-less response would never move
                // the checkpoint past VTSs we were just told about
                // (spec §4.E).
                let rvts_prime = match payload.maxvts {
                    Some(maxvts) => Vts(maxvts),
                    None => {
                        let current = self.sync_state.rvts(&pattern_str);
                        payload
                            .vts
                            .iter()
                            .copied()
                            .map(Vts)
                            .fold(current, std::cmp::max)
                    }
                };
                if missing.is_empty() {
                    self.sync_state.commit_rvts(&pattern_str, rvts_prime);
                    self.reschedule_advance(pattern, payload.maxvts.is_some());
                } else {
                    let op_id = self.next_operation_id();
                    self.enqueue(Operation::new(
                        op_id,
                        Variant::Fetch { pattern, vts_list: missing, rvts_prime },
                    ));
                }
            }
            ResponseKind::Error(e) => {
                log::warn!(target: OP_TARGET, "advance for {pattern_str} failed: {}", e.msg);
                self.reschedule_advance(pattern, false);
            }
            other => {
                log::warn!(target: OP_TARGET, "unexpected advance response: {other:?}");
                self.reschedule_advance(pattern, false);
            }
        }
    }

    fn handle_fetch_response(&mut self, pattern: Key, rvts_prime: Vts, response: ResponseKind) {
        let pattern_str = pattern.to_string();
        match response {
            ResponseKind::Fetch(payload) => {
                for value_payload in payload.response {
                    let Ok(key) = Key::from_components(value_payload.path.clone()) else {
                        log::warn!(target: OP_TARGET, "fetch returned an unparseable path, dropping");
                        continue;
                    };
                    let value = Value {
                        key,
                        exists: value_payload.exists,
                        data: value_payload.data.clone(),
                        acl_id: value_payload.acl_id.clone(),
                        creator: value_payload.creator.clone(),
                        cts: value_payload.cts(),
                        vts: value_payload.vts(),
                        stable: value_payload.stable,
                    };
                    if self.sync_state.apply(value.clone()) {
                        self.deliver_to_listeners(&value);
                    }
                }
                self.sync_state.commit_rvts(&pattern_str, rvts_prime);
                self.reschedule_advance(pattern, true);
            }
            ResponseKind::Error(e) => {
                log::warn!(target: OP_TARGET, "fetch for {pattern_str} failed: {}", e.msg);
                self.reschedule_advance(pattern, false);
            }
            other => {
                log::warn!(target: OP_TARGET, "unexpected fetch response: {other:?}");
                self.reschedule_advance(pattern, false);
            }
        }
    }

    /// `immediate`: re-poll right away because there is likely more data
    /// waiting. Otherwise waits out `advance_delay` (spec §4.E, §9). A
    /// pattern that was unsubscribed while its round was in flight is left
    /// alone.
    fn reschedule_advance(&mut self, pattern: Key, immediate: bool) {
        let pattern_str = pattern.to_string();
        if !self.sync_state.is_advance_scheduled(&pattern_str) {
            return;
        }
        if immediate {
            let rvts = self.sync_state.rvts(&pattern_str);
            let op_id = self.next_operation_id();
            self.enqueue(Operation::new(op_id, Variant::Advance { pattern, rvts: Some(rvts) }));
        } else {
            self.advance_due
                .insert(pattern_str, Instant::now() + self.config.advance_delay);
        }
    }

    /// Starts every queued operation whose signature doesn't conflict with
    /// one already in flight, provided the transport is open (spec §4.E,
    /// §5 "query signature serialization").
    async fn try_start_ready_operations(&mut self) {
        if !self.transport.is_open() {
            return;
        }
        let mut index = 0;
        while index < self.queue.len() {
            let signature = self.queue[index].signature();
            if has_signature_conflict(&self.pending, &signature) {
                index += 1;
                continue;
            }
            let mut operation = self.queue.remove(index).unwrap();
            self.start_operation(&mut operation).await;
            let closure = operation.closure.clone().expect("start_operation always assigns one");
            self.pending.insert(closure, operation);
        }
    }

    /// Starts (or resends) `operation`. A closure already assigned to this
    /// operation — i.e. this is a resend after a timeout — is reused rather
    /// than replaced: the server correlates retries to the same logical
    /// request by `closure`, which must stay stable across resends
    /// (spec §4.E, `Operation::closure`'s doc comment).
    async fn start_operation(&mut self, operation: &mut Operation) {
        operation.stage = Stage::Started;
        let closure = operation.closure.clone().unwrap_or_else(|| {
            let closure = format!("c{}", self.next_closure_id);
            self.next_closure_id += 1;
            closure
        });
        operation.closure = Some(closure.clone());
        operation.deadline = Some(Instant::now() + self.config.operation_timeout);

        let envelope = build_envelope(operation, closure);
        if let Err(e) = self.transport.send(&envelope).await {
            log::warn!(target: OP_TARGET, "send failed for operation {}, will retry on timeout: {e}", operation.id);
        }
    }

    /// Sweeps due advance reschedules and timed-out in-flight operations.
    async fn handle_tick(&mut self) {
        let now = Instant::now();

        let due_patterns: Vec<String> = self
            .advance_due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(pattern, _)| pattern.clone())
            .collect();
        for pattern_str in due_patterns {
            self.advance_due.remove(&pattern_str);
            if !self.sync_state.is_advance_scheduled(&pattern_str) {
                continue;
            }
            let Ok(pattern) = Key::parse(&pattern_str) else { continue };
            let rvts = self.sync_state.rvts(&pattern_str);
            let op_id = self.next_operation_id();
            self.enqueue(Operation::new(op_id, Variant::Advance { pattern, rvts: Some(rvts) }));
        }

        let expired_closures: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, op)| op.deadline.map(|d| d <= now).unwrap_or(false))
            .map(|(closure, _)| closure.clone())
            .collect();
        for closure in expired_closures {
            if let Some(mut operation) = self.pending.remove(&closure) {
                log::warn!(target: OP_TARGET, "operation {} timed out, resending under the same closure", operation.id);
                operation.stage = Stage::Queued;
                operation.deadline = None;
                self.queue.push_back(operation);
            }
        }

        if !self.transport.is_open() {
            self.transport.ensure_connecting(self.auth.clone());
        }
    }
}

fn spawn_delivery(callback: Arc<dyn ValueListener>, value: Value) {
    tokio::spawn(async move {
        callback.on_value(value);
    });
}

fn build_envelope(operation: &Operation, closure: String) -> Envelope {
    match &operation.variant {
        Variant::Publish { key, data, delete_path, acl_id, cts, .. } => Envelope::request(
            "pub",
            PublishPayload {
                path: key.components().to_vec(),
                delete_path: *delete_path,
                cts: cts.0,
                data: data.clone(),
                assume_acl: acl_id.clone(),
            },
            closure,
        ),
        Variant::Subscribe { key, .. } => {
            Envelope::request("sub", PathPayload { path: key.components().to_vec() }, closure)
        }
        Variant::Unsubscribe { key, .. } => {
            Envelope::request("unsub", PathPayload { path: key.components().to_vec() }, closure)
        }
        Variant::GetAcls { .. } => Envelope::request("getAcls", EmptyPayload::default(), closure),
        Variant::Advance { pattern, rvts } => Envelope::request(
            "advance",
            AdvancePayload {
                pattern: pattern.components().to_vec(),
                rvts: rvts.unwrap_or(Vts(0)).0,
            },
            closure,
        ),
        Variant::Fetch { vts_list, .. } => Envelope::request(
            "fetch",
            FetchPayload { vts: vts_list.iter().map(|v| v.0).collect() },
            closure,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtsync_shared::protocol::{ErrorPayload, HappyPayload};

    fn k(s: &str) -> Key {
        Key::parse(s).unwrap()
    }

    #[test]
    fn happy_with_zero_code_is_ok() {
        assert!(happy_or_error(ResponseKind::Happy(HappyPayload { code: 0, msg: "ok".into() })).is_ok());
    }

    #[test]
    fn happy_with_nonzero_code_is_a_request_error() {
        let err = happy_or_error(ResponseKind::Happy(HappyPayload { code: 7, msg: "nope".into() }))
            .unwrap_err();
        assert_eq!(err.error_code(), 4);
    }

    #[test]
    fn error_envelope_is_a_request_error() {
        let err = happy_or_error(ResponseKind::Error(ErrorPayload { msg: "boom".into() })).unwrap_err();
        assert_eq!(err.error_code(), 4);
    }

    #[test]
    fn mismatched_response_shape_is_internal() {
        let err = happy_or_error(ResponseKind::GetAcls(vtsync_shared::protocol::GetAclsResponsePayload {
            acls: vec![],
        }))
        .unwrap_err();
        assert_eq!(err.error_code(), 1);
    }

    #[test]
    fn conflicting_signature_is_detected() {
        let (done, _rx) = oneshot::channel();
        let mut pending = HashMap::new();
        pending.insert(
            "c1".to_string(),
            Operation::new(1, Variant::Subscribe { key: k("foo"), done }),
        );
        let (done2, _rx2) = oneshot::channel();
        let conflicting = Operation::new(2, Variant::Subscribe { key: k("foo"), done: done2 });
        assert!(has_signature_conflict(&pending, &conflicting.signature()));

        let (done3, _rx3) = oneshot::channel();
        let distinct = Operation::new(3, Variant::Subscribe { key: k("bar"), done: done3 });
        assert!(!has_signature_conflict(&pending, &distinct.signature()));
    }

    #[test]
    fn publish_envelope_carries_path_and_cts() {
        let (done, _rx) = oneshot::channel();
        let mut op = Operation::new(
            1,
            Variant::Publish {
                key: k("a.b"),
                data: Some("\"v\"".to_string()),
                delete_path: false,
                acl_id: Some("$publicCreate".to_string()),
                cts: Cts(42),
                done,
            },
        );
        op.closure = Some("c1".to_string());
        let envelope = build_envelope(&op, "c1".to_string());
        assert_eq!(envelope.kind, "pub");
        let payload: PublishPayload = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(payload.path, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(payload.cts, 42);
    }

    #[test]
    fn advance_envelope_carries_pattern_and_rvts() {
        let op = Operation::new(1, Variant::Advance { pattern: k("a.*"), rvts: Some(Vts(9)) });
        let envelope = build_envelope(&op, "c1".to_string());
        assert_eq!(envelope.kind, "advance");
        let payload: AdvancePayload = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(payload.rvts, 9);
        assert_eq!(payload.pattern, vec!["a".to_string(), "*".to_string()]);
    }
}
