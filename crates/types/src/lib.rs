//! Core types for the Lodestone transaction admission core.
//!
//! This crate provides the foundational types shared by the pool and the
//! state-commitment collaborator:
//!
//! - **Identifiers**: [`SenderId`]
//! - **Transaction data**: [`TxSlot`], the immutable submitted record
//! - **Account state**: [`AccountInfo`] and the [`AccountReader`] trait the
//!   pool uses to refresh sender snapshots
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod account;
mod identifiers;
mod slot;

pub use account::{AccountInfo, AccountReadError, AccountReader, EMPTY_CODE_HASH};
pub use identifiers::SenderId;
pub use slot::TxSlot;

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use alloy_primitives::U256;
    use std::collections::HashMap;

    /// In-memory [`AccountReader`] backed by a `HashMap`.
    ///
    /// Useful for pool tests that need snapshot refreshes without a real
    /// state backend.
    #[derive(Debug, Default)]
    pub struct MemoryAccountReader {
        accounts: HashMap<SenderId, AccountInfo>,
        /// When set, every read fails with this reason.
        pub fail_with: Option<String>,
    }

    impl MemoryAccountReader {
        /// Create an empty reader.
        pub fn new() -> Self {
            Self::default()
        }

        /// Insert or replace an account.
        pub fn put(&mut self, sender: SenderId, nonce: u64, balance: U256) {
            self.accounts.insert(
                sender,
                AccountInfo {
                    nonce,
                    balance,
                    code_hash: EMPTY_CODE_HASH,
                },
            );
        }
    }

    impl AccountReader for MemoryAccountReader {
        fn account(&self, sender: SenderId) -> Result<Option<AccountInfo>, AccountReadError> {
            if let Some(reason) = &self.fail_with {
                return Err(AccountReadError::Backend {
                    sender,
                    reason: reason.clone(),
                });
            }
            Ok(self.accounts.get(&sender).copied())
        }
    }
}
