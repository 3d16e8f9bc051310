use std::fmt;

use crate::error::{InvalidKey, InvalidKeyCause};

/// Maximum number of components a [`Key`] may contain.
pub const MAX_COMPONENTS: usize = 16;
/// Maximum length of a key's joined string form.
pub const MAX_KEY_LENGTH: usize = 200;

const SEPARATOR: char = '.';
const SINGLE_WILDCARD: &str = "*";
const TAIL_WILDCARD: &str = "#";

/// A hierarchical, period-delimited key: an ordered sequence of 0-16
/// non-empty components. The zero-component key is the root.
///
/// A `Key` is either *concrete* (no wildcard components) or a *pattern*
/// (contains `*` or `#`). Construction always validates; there is no way to
/// hold an invalid `Key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    components: Vec<String>,
}

impl Key {
    /// The zero-component root key.
    pub fn root() -> Self {
        Self { components: Vec::new() }
    }

    /// Parses and validates a joined key string (e.g. `"foo.bar"`, `""` for
    /// root, `"foo.*.baz"`, `"foo.bar.#"`).
    pub fn parse(s: &str) -> Result<Self, InvalidKey> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let components: Vec<String> = s.split(SEPARATOR).map(str::to_string).collect();
        Self::from_components(components)
    }

    /// Builds a `Key` from already-split components, validating them.
    pub fn from_components(components: Vec<String>) -> Result<Self, InvalidKey> {
        let key = Self { components };
        key.validate()?;
        Ok(key)
    }

    fn validate(&self) -> Result<(), InvalidKey> {
        if self.components.len() > MAX_COMPONENTS {
            return Err(InvalidKey::new(InvalidKeyCause::TooManyComponents {
                count: self.components.len(),
            }));
        }
        let len = self.components.len();
        for (i, component) in self.components.iter().enumerate() {
            if component.is_empty() {
                return Err(InvalidKey::new(InvalidKeyCause::EmptyComponent { index: i }));
            }
            if component == TAIL_WILDCARD {
                if i != len - 1 {
                    return Err(InvalidKey::new(InvalidKeyCause::HashNotFinal { index: i }));
                }
                continue;
            }
            if component == SINGLE_WILDCARD {
                continue;
            }
            if let Some(bad) = component.chars().find(|c| !is_token_char(*c)) {
                return Err(InvalidKey::new(InvalidKeyCause::InvalidCharacter {
                    index: i,
                    character: bad,
                }));
            }
        }
        let joined_len = self.to_string().len();
        if joined_len > MAX_KEY_LENGTH {
            return Err(InvalidKey::new(InvalidKeyCause::TooLong { length: joined_len }));
        }
        Ok(())
    }

    /// Number of components (0 for root).
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// True if any component is `*` or `#`.
    pub fn is_pattern(&self) -> bool {
        self.components
            .iter()
            .any(|c| c == SINGLE_WILDCARD || c == TAIL_WILDCARD)
    }

    /// The final component, or `None` for the root key.
    pub fn last_component(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Drops the last component. The parent of the root is the root.
    pub fn parent(&self) -> Self {
        if self.components.is_empty() {
            return self.clone();
        }
        Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        }
    }

    /// Appends `component`, without re-validating the child against the
    /// key-level rules (the caller should check, e.g. via [`Key::validate`]
    /// through [`Key::from_components`] with the full list, or
    /// [`Key::parse`]). Callers are expected to confirm validity themselves
    /// before using the result on the network, per the spec's `child()`
    /// contract.
    pub fn child(&self, component: impl Into<String>) -> Self {
        let mut components = self.components.clone();
        components.push(component.into());
        Self { components }
    }

    /// Returns true if `pattern` (`self`) matches the concrete key
    /// `concrete`. See spec §4.A for the exact wildcard semantics.
    pub fn matches(&self, concrete: &Key) -> bool {
        if !self.is_pattern() {
            return self == concrete;
        }
        let pattern = &self.components;
        let target = &concrete.components;
        for (i, p) in pattern.iter().enumerate() {
            if p == TAIL_WILDCARD {
                return true;
            }
            if i >= target.len() {
                return false;
            }
            if p == SINGLE_WILDCARD {
                continue;
            }
            if p != &target[i] {
                return false;
            }
        }
        target.len() == pattern.len()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("."))
    }
}

impl std::str::FromStr for Key {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}
