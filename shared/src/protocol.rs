//! Wire envelope and request/response payload shapes (spec §4.C, §6).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{Cts, Vts};

/// Fixed envelope version this revision speaks.
pub const PROTOCOL_VERSION: u32 = 15;

/// The outer envelope every request and response is wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub kind: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure: Option<String>,
}

impl Envelope {
    pub fn request(kind: &str, payload: impl Serialize, closure: String) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).expect("request payload always serializes"),
            closure: Some(closure),
        }
    }

    /// Serializes this envelope as a single line of JSON text.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("envelope always serializes")
    }

    /// Parses and version-checks a raw inbound message.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: envelope.version,
            });
        }
        Ok(envelope)
    }
}

/// Errors decoding or interpreting an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("envelope version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("response kind '{0}' carried a payload that did not match its expected shape: {1}")]
    BadPayload(String, String),

    #[error("unknown response kind '{0}'")]
    UnknownKind(String),
}

// ---- request payloads ----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishPayload {
    pub path: Vec<String>,
    pub delete_path: bool,
    pub cts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "assumeACL")]
    pub assume_acl: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPayload {
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancePayload {
    pub pattern: Vec<String>,
    pub rvts: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPayload {
    pub vts: Vec<u64>,
}

// ---- response payloads ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HappyPayload {
    pub code: i32,
    pub msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuePayload {
    pub path: Vec<String>,
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub acl_id: String,
    pub creator: String,
    pub cts: u64,
    pub vts: u64,
    pub stable: bool,
}

impl ValuePayload {
    pub fn cts(&self) -> Cts {
        Cts(self.cts)
    }

    pub fn vts(&self) -> Vts {
        Vts(self.vts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceResponsePayload {
    pub vts: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxvts: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponsePayload {
    pub response: Vec<ValuePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAclsResponsePayload {
    pub acls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponsePayload {
    pub uuid: String,
    pub uid: String,
    pub expires: u64,
}

/// A decoded, typed response, dispatched on `Envelope::kind`.
#[derive(Debug, Clone)]
pub enum ResponseKind {
    Happy(HappyPayload),
    Error(ErrorPayload),
    Data(ValuePayload),
    Advance(AdvanceResponsePayload),
    Fetch(FetchResponsePayload),
    GetAcls(GetAclsResponsePayload),
    Connect(ConnectResponsePayload),
}

impl ResponseKind {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let parse = |v: &serde_json::Value| {
            serde_json::from_value(v.clone())
                .map_err(|e| ProtocolError::BadPayload(envelope.kind.clone(), e.to_string()))
        };
        Ok(match envelope.kind.as_str() {
            "happy" => ResponseKind::Happy(parse(&envelope.payload)?),
            "error" => ResponseKind::Error(parse(&envelope.payload)?),
            "data" => ResponseKind::Data(parse(&envelope.payload)?),
            "advanceResponse" => ResponseKind::Advance(parse(&envelope.payload)?),
            "fetchResponse" => ResponseKind::Fetch(parse(&envelope.payload)?),
            "getAclsResponse" => ResponseKind::GetAcls(parse(&envelope.payload)?),
            "connectResponse" => ResponseKind::Connect(parse(&envelope.payload)?),
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        })
    }
}
