//! Batch construction for state updates.
//!
//! Collects balance, nonce, code, storage and delete operations per plain
//! key and emits them as parallel key/update slices sorted by hashed key,
//! the order the commitment subsystem consumes them in.

use crate::update::{StateUpdate, UpdateFlags};
use alloy_primitives::{keccak256, U256};
use std::collections::{HashMap, HashSet};

/// Collects updates to the state and provides them in properly sorted form.
///
/// Account keys hash to 64 nibbles, storage keys to 128 (account hash
/// nibbles followed by slot hash nibbles); batches sort by that hashed key.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    balances: HashMap<Vec<u8>, U256>,
    nonces: HashMap<Vec<u8>, u64>,
    code_hashes: HashMap<Vec<u8>, [u8; 32]>,
    storages: HashMap<Vec<u8>, HashMap<Vec<u8>, Vec<u8>>>,
    deletes: HashSet<Vec<u8>>,
    storage_deletes: HashMap<Vec<u8>, HashSet<Vec<u8>>>,
}

impl UpdateBatch {
    /// Start an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an account balance.
    pub fn balance(mut self, address: &[u8], balance: U256) -> Self {
        self.deletes.remove(address);
        self.balances.insert(address.to_vec(), balance);
        self
    }

    /// Set an account nonce.
    pub fn nonce(mut self, address: &[u8], nonce: u64) -> Self {
        self.deletes.remove(address);
        self.nonces.insert(address.to_vec(), nonce);
        self
    }

    /// Set an account code hash.
    pub fn code_hash(mut self, address: &[u8], code_hash: [u8; 32]) -> Self {
        self.deletes.remove(address);
        self.code_hashes.insert(address.to_vec(), code_hash);
        self
    }

    /// Set a storage slot value (at most 32 bytes).
    pub fn storage(mut self, address: &[u8], location: &[u8], value: &[u8]) -> Self {
        if let Some(deleted) = self.storage_deletes.get_mut(address) {
            deleted.remove(location);
            if deleted.is_empty() {
                self.storage_deletes.remove(address);
            }
        }
        self.storages
            .entry(address.to_vec())
            .or_default()
            .insert(location.to_vec(), value.to_vec());
        self
    }

    /// Delete an account, superseding any staged field updates for it.
    pub fn delete(mut self, address: &[u8]) -> Self {
        self.balances.remove(address);
        self.nonces.remove(address);
        self.code_hashes.remove(address);
        self.storages.remove(address);
        self.deletes.insert(address.to_vec());
        self
    }

    /// Delete a storage slot.
    pub fn delete_storage(mut self, address: &[u8], location: &[u8]) -> Self {
        if let Some(slots) = self.storages.get_mut(address) {
            slots.remove(location);
            if slots.is_empty() {
                self.storages.remove(address);
            }
        }
        self.storage_deletes
            .entry(address.to_vec())
            .or_default()
            .insert(location.to_vec());
        self
    }

    /// Emit the batch as parallel slices sorted by hashed key:
    /// plain keys, hashed keys, and the update records.
    pub fn build(&self) -> (Vec<Vec<u8>>, Vec<Vec<u8>>, Vec<StateUpdate>) {
        // (hashed key, plain key, update)
        let mut entries: Vec<(Vec<u8>, Vec<u8>, StateUpdate)> = Vec::new();

        let mut account_keys: HashSet<&Vec<u8>> = HashSet::new();
        account_keys.extend(self.balances.keys());
        account_keys.extend(self.nonces.keys());
        account_keys.extend(self.code_hashes.keys());
        account_keys.extend(self.deletes.iter());

        for address in account_keys {
            let update = if self.deletes.contains(address) {
                StateUpdate::deleted()
            } else {
                let mut update = StateUpdate::default();
                if let Some(balance) = self.balances.get(address) {
                    update.flags |= UpdateFlags::BALANCE;
                    update.balance = *balance;
                }
                if let Some(nonce) = self.nonces.get(address) {
                    update.flags |= UpdateFlags::NONCE;
                    update.nonce = *nonce;
                }
                if let Some(code_hash) = self.code_hashes.get(address) {
                    update.flags |= UpdateFlags::CODE;
                    update.code_hash_or_storage = *code_hash;
                }
                update
            };
            entries.push((nibble_hash(address), address.clone(), update));
        }

        let mut storage_keys: HashMap<&Vec<u8>, HashSet<&Vec<u8>>> = HashMap::new();
        for (address, slots) in &self.storages {
            storage_keys.entry(address).or_default().extend(slots.keys());
        }
        for (address, slots) in &self.storage_deletes {
            storage_keys.entry(address).or_default().extend(slots.iter());
        }

        for (address, locations) in storage_keys {
            let address_hash = nibble_hash(address);
            for location in locations {
                let deleted = self
                    .storage_deletes
                    .get(address)
                    .is_some_and(|d| d.contains(location));
                let update = if deleted {
                    StateUpdate::deleted()
                } else {
                    let value = &self.storages[address][location];
                    StateUpdate::storage(value)
                };

                let mut hashed = Vec::with_capacity(128);
                hashed.extend_from_slice(&address_hash);
                hashed.extend_from_slice(&nibble_hash(location));

                let mut plain = Vec::with_capacity(address.len() + location.len());
                plain.extend_from_slice(address);
                plain.extend_from_slice(location);

                entries.push((hashed, plain, update));
            }
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut plain_keys = Vec::with_capacity(entries.len());
        let mut hashed_keys = Vec::with_capacity(entries.len());
        let mut updates = Vec::with_capacity(entries.len());
        for (hashed, plain, update) in entries {
            hashed_keys.push(hashed);
            plain_keys.push(plain);
            updates.push(update);
        }
        (plain_keys, hashed_keys, updates)
    }
}

/// keccak256 of the key, expanded to one nibble per byte.
fn nibble_hash(key: &[u8]) -> Vec<u8> {
    let hash = keccak256(key);
    let mut nibbles = Vec::with_capacity(64);
    for byte in hash.as_slice() {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles
}
