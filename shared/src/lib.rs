//! Wire-level data model for vtsync: hierarchical keys and wildcard
//! pattern matching, the static ACL catalog, observed values, and the
//! JSON request/response envelope. Pure, dependency-light, and usable
//! without any client runtime (see spec §4.A-§4.C).

pub mod acl;
pub mod error;
pub mod key;
pub mod protocol;
pub mod value;

pub use acl::Acl;
pub use error::{InvalidKey, InvalidKeyCause};
pub use key::Key;
pub use value::{Cts, Value, Vts};
