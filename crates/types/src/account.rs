//! Committed account state as viewed by the pool.

use crate::SenderId;
use alloy_primitives::{hex, U256};
use thiserror::Error;

/// keccak256 of the empty byte string: the code hash of accounts without code.
pub const EMPTY_CODE_HASH: [u8; 32] =
    hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Committed state of a single account, as of the latest known block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    /// Committed nonce.
    pub nonce: u64,
    /// Committed balance.
    pub balance: U256,
    /// Hash of the account's code, [`EMPTY_CODE_HASH`] for plain accounts.
    pub code_hash: [u8; 32],
}

impl AccountInfo {
    /// An account that has never appeared in committed state.
    pub const fn empty() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            code_hash: EMPTY_CODE_HASH,
        }
    }
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self::empty()
    }
}

/// Error reading an account from the state backend.
///
/// The pool treats these as transient: it keeps the last known snapshot and
/// retries on the next refresh.
#[derive(Debug, Error)]
pub enum AccountReadError {
    /// The backend failed to serve the read.
    #[error("account read failed for {sender}: {reason}")]
    Backend {
        /// Sender whose account was requested.
        sender: SenderId,
        /// Backend-specific failure description.
        reason: String,
    },
}

/// Read access to committed account state.
///
/// Implemented by the state aggregate that sits over the on-disk store. The
/// pool calls this during sender snapshot refresh, never inside a block
/// handler pass.
pub trait AccountReader {
    /// Look up the committed state of `sender`.
    ///
    /// Returns `Ok(None)` when the account has never been seen in committed
    /// state (distinct from a backend failure).
    fn account(&self, sender: SenderId) -> Result<Option<AccountInfo>, AccountReadError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryAccountReader;

    #[test]
    fn empty_account_has_empty_code_hash() {
        let acct = AccountInfo::empty();
        assert_eq!(acct.nonce, 0);
        assert_eq!(acct.balance, U256::ZERO);
        assert_eq!(acct.code_hash, EMPTY_CODE_HASH);
    }

    #[test]
    fn memory_reader_distinguishes_missing_from_failed() {
        let mut reader = MemoryAccountReader::new();
        reader.put(SenderId(1), 3, U256::from(100u64));

        let found = reader.account(SenderId(1)).unwrap().unwrap();
        assert_eq!(found.nonce, 3);
        assert!(reader.account(SenderId(2)).unwrap().is_none());

        reader.fail_with = Some("backend down".into());
        assert!(reader.account(SenderId(1)).is_err());
    }
}
