use thiserror::Error;

use crate::key::{MAX_COMPONENTS, MAX_KEY_LENGTH};

/// The specific cause behind an [`InvalidKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidKeyCause {
    /// More than [`MAX_COMPONENTS`] components.
    #[error("key has {count} components, more than the maximum of {MAX_COMPONENTS}")]
    TooManyComponents { count: usize },

    /// A component was the empty string.
    #[error("component at index {index} is empty")]
    EmptyComponent { index: usize },

    /// A component contained a character outside `[A-Za-z0-9_-]`.
    #[error("component at index {index} contains invalid character '{character}'")]
    InvalidCharacter { index: usize, character: char },

    /// `#` appeared somewhere other than the final component.
    #[error("'#' wildcard at index {index} is not the final component")]
    HashNotFinal { index: usize },

    /// The joined string form exceeded [`MAX_KEY_LENGTH`].
    #[error("key length {length} exceeds the maximum of {MAX_KEY_LENGTH}")]
    TooLong { length: usize },
}

/// A rejected [`crate::key::Key`]. Always carries one specific [`InvalidKeyCause`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid key: {cause}")]
pub struct InvalidKey {
    pub cause: InvalidKeyCause,
}

impl InvalidKey {
    pub fn new(cause: InvalidKeyCause) -> Self {
        Self { cause }
    }
}
