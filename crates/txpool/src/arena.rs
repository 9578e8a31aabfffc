//! Handle-indexed storage for pool entries.
//!
//! Entries reference sender snapshots and sender snapshots reference
//! entries; both sides hold a [`TxHandle`] into the arena instead of owning
//! the entry, so no ownership cycle exists at runtime. Destruction is the
//! sole operation that invalidates a handle, and it happens only during
//! eviction or block commit.

use crate::marker::{SubPoolKind, SubPoolMarker};
use lodestone_types::TxSlot;

/// Stable 32-bit index of a pool entry in its [`TxArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxHandle(u32);

impl TxHandle {
    /// The raw index value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// A transaction slot annotated with its current classification.
#[derive(Debug, Clone)]
pub struct MetaTx {
    /// The underlying submitted transaction. Exclusively owned by the pool;
    /// removal from the arena is destruction.
    pub tx: TxSlot,
    /// Current classification marker.
    pub sub_pool: SubPoolMarker,
    /// Whether the transaction originated from this node.
    pub is_local: bool,
    /// Cached result of the balance predicate from the latest sender scan.
    pub sender_has_enough_balance: bool,
    /// Which sub-pool currently holds this entry, if any.
    pub location: Option<SubPoolKind>,
}

impl MetaTx {
    /// Wrap a freshly submitted slot. The marker starts empty and is set by
    /// the first sender scan before the entry lands in a sub-pool.
    pub fn new(tx: TxSlot, is_local: bool) -> Self {
        Self {
            tx,
            sub_pool: SubPoolMarker::from_bits(0),
            is_local,
            sender_has_enough_balance: false,
            location: None,
        }
    }
}

/// Slot arena owning every live pool entry.
#[derive(Debug, Default)]
pub struct TxArena {
    slots: Vec<Option<MetaTx>>,
    free: Vec<u32>,
}

impl TxArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether the arena holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert an entry, reusing a freed slot when available.
    pub fn insert(&mut self, meta: MetaTx) -> TxHandle {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(meta);
            TxHandle(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(meta));
            TxHandle(idx)
        }
    }

    /// Destroy an entry, returning it. `None` if the handle is dangling.
    pub fn remove(&mut self, handle: TxHandle) -> Option<MetaTx> {
        let slot = self.slots.get_mut(handle.0 as usize)?;
        let meta = slot.take()?;
        self.free.push(handle.0);
        Some(meta)
    }

    /// Borrow an entry. `None` if the handle is dangling.
    pub fn get(&self, handle: TxHandle) -> Option<&MetaTx> {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    /// Mutably borrow an entry. `None` if the handle is dangling.
    pub fn get_mut(&mut self, handle: TxHandle) -> Option<&mut MetaTx> {
        self.slots.get_mut(handle.0 as usize)?.as_mut()
    }

    /// Visit every live entry in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (TxHandle, &MetaTx)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|meta| (TxHandle(i as u32), meta)))
    }
}

/// A dangling handle inside the pool is an invariant violation, so internal
/// code indexes instead of matching on `Option`.
impl std::ops::Index<TxHandle> for TxArena {
    type Output = MetaTx;

    fn index(&self, handle: TxHandle) -> &MetaTx {
        self.get(handle)
            .unwrap_or_else(|| panic!("dangling tx handle {}", handle.0))
    }
}

impl std::ops::IndexMut<TxHandle> for TxArena {
    fn index_mut(&mut self, handle: TxHandle) -> &mut MetaTx {
        self.get_mut(handle)
            .unwrap_or_else(|| panic!("dangling tx handle {}", handle.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use lodestone_types::SenderId;

    fn slot(nonce: u64) -> TxSlot {
        TxSlot {
            sender: SenderId(1),
            nonce,
            tip: 1,
            fee_cap: 1,
            gas: 1,
            value: U256::ZERO,
        }
    }

    #[test]
    fn insert_remove_reuses_slots() {
        let mut arena = TxArena::new();
        let a = arena.insert(MetaTx::new(slot(0), false));
        let b = arena.insert(MetaTx::new(slot(1), false));
        assert_eq!(arena.len(), 2);

        let removed = arena.remove(a).unwrap();
        assert_eq!(removed.tx.nonce, 0);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(a).is_none());

        // The freed slot is reused; the old handle stays dangling until then.
        let c = arena.insert(MetaTx::new(slot(2), false));
        assert_eq!(c.as_u32(), a.as_u32());
        assert_eq!(arena[c].tx.nonce, 2);
        assert_eq!(arena[b].tx.nonce, 1);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn iter_visits_each_live_entry_once() {
        let mut arena = TxArena::new();
        for n in 0..5 {
            arena.insert(MetaTx::new(slot(n), false));
        }
        let seen: Vec<u64> = {
            let mut v: Vec<u64> = arena.iter().map(|(_, m)| m.tx.nonce).collect();
            v.sort_unstable();
            v
        };
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    #[should_panic(expected = "dangling tx handle")]
    fn indexing_a_dangling_handle_panics() {
        let mut arena = TxArena::new();
        let h = arena.insert(MetaTx::new(slot(0), false));
        arena.remove(h);
        let _ = &arena[h];
    }
}
