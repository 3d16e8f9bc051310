use std::time::Instant;

use tokio::sync::oneshot;

use vtsync_shared::value::{Cts, Vts};
use vtsync_shared::Key;

use crate::error::ClientError;

/// The discriminant half of an operation's *query signature* (spec §4.F):
/// operations sharing a `(kind, key)` signature are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Publish,
    Subscribe,
    Unsubscribe,
    GetAcls,
    Advance,
    Fetch,
}

/// A query signature: `(kind, key)` for keyed operations, `(kind, None)`
/// for `GetAcls`. Operations sharing a signature execute FIFO; operations
/// on distinct signatures may interleave (spec §5, §4.F).
pub type Signature = (OperationKind, Option<String>);

/// Variant-specific data and per-variant completion channel for an
/// Operation (spec §3 "Operation", §4.E).
pub enum Variant {
    Publish {
        key: Key,
        data: Option<String>,
        delete_path: bool,
        acl_id: Option<String>,
        cts: Cts,
        done: oneshot::Sender<Result<(), ClientError>>,
    },
    Subscribe {
        key: Key,
        done: oneshot::Sender<Result<(), ClientError>>,
    },
    Unsubscribe {
        key: Key,
        done: oneshot::Sender<Result<(), ClientError>>,
    },
    GetAcls {
        done: oneshot::Sender<Result<Vec<String>, ClientError>>,
    },
    /// Internal: not directly requested by a caller. `rvts` is snapshotted
    /// from `rvts_dict` when the operation starts (spec §4.E).
    Advance { pattern: Key, rvts: Option<Vts> },
    /// Internal: `rvts_prime` is committed to `rvts_dict` on success.
    Fetch {
        pattern: Key,
        vts_list: Vec<Vts>,
        rvts_prime: Vts,
    },
}

impl Variant {
    pub fn kind(&self) -> OperationKind {
        match self {
            Variant::Publish { .. } => OperationKind::Publish,
            Variant::Subscribe { .. } => OperationKind::Subscribe,
            Variant::Unsubscribe { .. } => OperationKind::Unsubscribe,
            Variant::GetAcls { .. } => OperationKind::GetAcls,
            Variant::Advance { .. } => OperationKind::Advance,
            Variant::Fetch { .. } => OperationKind::Fetch,
        }
    }

    /// The key this operation is associated with, if any (spec §3).
    pub fn key(&self) -> Option<&Key> {
        match self {
            Variant::Publish { key, .. } => Some(key),
            Variant::Subscribe { key, .. } => Some(key),
            Variant::Unsubscribe { key, .. } => Some(key),
            Variant::Advance { pattern, .. } => Some(pattern),
            Variant::Fetch { pattern, .. } => Some(pattern),
            Variant::GetAcls { .. } => None,
        }
    }

    pub fn signature(&self) -> Signature {
        (self.kind(), self.key().map(ToString::to_string))
    }
}

/// An Operation's lifecycle state (spec §3 "Lifecycles", §4.E):
/// queued -> started -> responded -> finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Queued,
    Started,
    Finished,
}

/// A queued unit of work: binds a [`Variant`] to a request closure id once
/// started, and tracks the timeout deadline for resend (spec §4.E).
pub struct Operation {
    pub id: u64,
    pub variant: Variant,
    pub stage: Stage,
    /// Assigned the first time the operation is started; stable across
    /// resends so the server (and our own pending-request table) can
    /// correlate retries to the same logical request.
    pub closure: Option<String>,
    pub deadline: Option<Instant>,
}

impl Operation {
    pub fn new(id: u64, variant: Variant) -> Self {
        Self {
            id,
            variant,
            stage: Stage::Queued,
            closure: None,
            deadline: None,
        }
    }

    pub fn signature(&self) -> Signature {
        self.variant.signature()
    }

    pub fn is_started(&self) -> bool {
        matches!(self.stage, Stage::Started)
    }
}
