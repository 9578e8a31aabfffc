//! Identifier newtypes.

use std::fmt;

/// Opaque identifier for a transaction sender.
///
/// Senders are resolved upstream from signature recovery; the pool never
/// sees raw addresses or public keys, only this 64-bit handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SenderId(pub u64);

impl SenderId {
    /// The numeric value of the identifier.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender-{}", self.0)
    }
}

impl From<u64> for SenderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
