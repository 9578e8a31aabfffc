//! Store interfaces shared with the commitment subsystem.

use crate::branch::BranchData;
use crate::error::DecodeError;
use crate::update::{StateUpdate, UpdateFlags};
use alloy_primitives::hex;
use std::collections::HashMap;
use thiserror::Error;

/// Error from a branch or state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A persisted record failed to decode.
    #[error("malformed record under key {key}: {source}")]
    Corrupt {
        /// Hex rendering of the offending key.
        key: String,
        /// The underlying decode failure.
        #[source]
        source: DecodeError,
    },

    /// The backing store failed to serve the request.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Read access to branch data, keyed by byte-string prefix through the trie.
pub trait BranchReader {
    /// Look up the branch stored under `prefix`.
    fn branch(&self, prefix: &[u8]) -> Result<Option<BranchData>, StoreError>;
}

/// Write access to branch data.
pub trait BranchWriter {
    /// Merge `update` onto whatever is stored under `prefix`.
    fn apply_branch(&mut self, prefix: &[u8], update: BranchData) -> Result<(), StoreError>;
}

/// In-memory commitment store.
///
/// Holds branch data and encoded state update records. Backs the round-trip
/// test harness and serves as the reference implementation of the store
/// traits.
#[derive(Debug, Default)]
pub struct MemoryCommitmentStore {
    branches: HashMap<Vec<u8>, BranchData>,
    state: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryCommitmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored branch records.
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Number of stored state records.
    pub fn state_count(&self) -> usize {
        self.state.len()
    }

    /// Apply one batch of state updates, keyed by plain key.
    ///
    /// A `DELETE` update removes the key outright. Any other update is
    /// overlaid field-by-field onto the decoded existing record, then the
    /// merged record is re-encoded in place.
    pub fn apply_state_updates(
        &mut self,
        plain_keys: &[Vec<u8>],
        updates: &[StateUpdate],
    ) -> Result<(), StoreError> {
        assert_eq!(plain_keys.len(), updates.len(), "keys and updates must pair up");
        for (key, update) in plain_keys.iter().zip(updates) {
            if update.flags.contains(UpdateFlags::DELETE) {
                self.state.remove(key);
                continue;
            }
            let merged = match self.state.get(key) {
                Some(encoded) => {
                    let mut existing =
                        StateUpdate::decode_exact(encoded).map_err(|source| StoreError::Corrupt {
                            key: hex::encode(key),
                            source,
                        })?;
                    existing.apply(update);
                    existing
                }
                None => update.clone(),
            };
            self.state.insert(key.clone(), merged.encode());
        }
        Ok(())
    }

    /// Read back the state record stored under `plain_key`.
    pub fn state(&self, plain_key: &[u8]) -> Result<Option<StateUpdate>, StoreError> {
        self.state
            .get(plain_key)
            .map(|encoded| {
                StateUpdate::decode_exact(encoded).map_err(|source| StoreError::Corrupt {
                    key: hex::encode(plain_key),
                    source,
                })
            })
            .transpose()
    }
}

impl BranchReader for MemoryCommitmentStore {
    fn branch(&self, prefix: &[u8]) -> Result<Option<BranchData>, StoreError> {
        Ok(self.branches.get(prefix).cloned())
    }
}

impl BranchWriter for MemoryCommitmentStore {
    fn apply_branch(&mut self, prefix: &[u8], update: BranchData) -> Result<(), StoreError> {
        match self.branches.get(prefix) {
            Some(existing) => {
                let merged = existing.merge(&update);
                self.branches.insert(prefix.to_vec(), merged);
            }
            None => {
                self.branches.insert(prefix.to_vec(), update);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::ChildRef;
    use alloy_primitives::U256;

    #[test]
    fn state_updates_merge_field_by_field() {
        let mut store = MemoryCommitmentStore::new();
        let key = vec![0x01; 20];

        store
            .apply_state_updates(
                std::slice::from_ref(&key),
                &[StateUpdate::balance(U256::from(100u64))],
            )
            .unwrap();
        store
            .apply_state_updates(std::slice::from_ref(&key), &[StateUpdate::nonce(7)])
            .unwrap();

        let merged = store.state(&key).unwrap().unwrap();
        assert!(merged.flags.contains(UpdateFlags::BALANCE | UpdateFlags::NONCE));
        assert_eq!(merged.balance, U256::from(100u64));
        assert_eq!(merged.nonce, 7);
    }

    #[test]
    fn delete_removes_the_key() {
        let mut store = MemoryCommitmentStore::new();
        let key = vec![0x02; 20];

        store
            .apply_state_updates(
                std::slice::from_ref(&key),
                &[StateUpdate::balance(U256::from(5u64))],
            )
            .unwrap();
        assert!(store.state(&key).unwrap().is_some());

        store
            .apply_state_updates(std::slice::from_ref(&key), &[StateUpdate::deleted()])
            .unwrap();
        assert!(store.state(&key).unwrap().is_none());
        assert_eq!(store.state_count(), 0);
    }

    #[test]
    fn branch_writes_merge_onto_existing_records() {
        let mut store = MemoryCommitmentStore::new();
        let prefix = vec![0x0a, 0x0b];

        let mut first = BranchData::new(0b0010, 0);
        first.set_child(1, ChildRef::hashed(vec![0x01]));
        store.apply_branch(&prefix, first).unwrap();

        let mut second = BranchData::new(0b0100, 0);
        second.set_child(1, ChildRef::hashed(vec![0xdd]));
        second.set_child(2, ChildRef::hashed(vec![0x02]));
        store.apply_branch(&prefix, second).unwrap();

        let stored = store.branch(&prefix).unwrap().unwrap();
        assert_eq!(stored.touch_map, 0b0110);
        // Child 1 was not touched by the second batch, so the first batch's
        // record survives.
        assert_eq!(stored.child(1), Some(&ChildRef::hashed(vec![0x01])));
        assert_eq!(stored.child(2), Some(&ChildRef::hashed(vec![0x02])));
    }

    #[test]
    fn missing_prefix_reads_as_none() {
        let store = MemoryCommitmentStore::new();
        assert!(store.branch(&[0xff]).unwrap().is_none());
        assert!(store.state(&[0xff]).unwrap().is_none());
    }
}
