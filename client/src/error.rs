use thiserror::Error;

use vtsync_shared::InvalidKey;

/// The four stable error categories a consumer can observe (spec §6, §7).
/// Each carries the integer code the spec fixes for it.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The server emitted an `error` envelope, or we received a malformed
    /// message. Logged; never surfaces from a listener registration.
    #[error("internal error: {0}")]
    Internal(String),

    /// A key failed validation before any network call was made.
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),

    /// A client-side constructor or argument failure (missing host/port,
    /// writing a non-string/non-object primitive, etc).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server returned a non-zero `happy.code`, or rejected the
    /// request outright (e.g. a write to an unauthorized destination).
    #[error("request error (code {code}): {message}")]
    RequestError { code: i32, message: String },
}

impl ClientError {
    /// The stable integer identifier from spec §6.
    pub fn error_code(&self) -> u8 {
        match self {
            ClientError::Internal(_) => 1,
            ClientError::InvalidKey(_) => 2,
            ClientError::InvalidRequest(_) => 3,
            ClientError::RequestError { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtsync_shared::error::InvalidKeyCause;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ClientError::Internal("x".into()).error_code(), 1);
        assert_eq!(
            ClientError::InvalidKey(InvalidKey::new(InvalidKeyCause::EmptyComponent { index: 0 }))
                .error_code(),
            2
        );
        assert_eq!(ClientError::InvalidRequest("x".into()).error_code(), 3);
        assert_eq!(
            ClientError::RequestError { code: 1, message: "x".into() }.error_code(),
            4
        );
    }
}
