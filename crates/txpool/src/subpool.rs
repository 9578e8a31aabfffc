//! A totally ordered collection of pool entries.

use crate::arena::{TxArena, TxHandle};
use crate::marker::{SubPoolKind, SubPoolMarker};
use lodestone_types::SenderId;
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Composite sort key: lexicographic `(marker, tip, -sender, -nonce)`.
///
/// Higher keys are better. For equal marker and tip, the lower sender and
/// nonce win, which keeps ordering deterministic across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    marker: SubPoolMarker,
    tip: u64,
    sender: Reverse<SenderId>,
    nonce: Reverse<u64>,
    handle: TxHandle,
}

impl OrderKey {
    fn of(arena: &TxArena, handle: TxHandle) -> Self {
        let meta = &arena[handle];
        Self {
            marker: meta.sub_pool,
            tip: meta.tx.tip,
            sender: Reverse(meta.tx.sender),
            nonce: Reverse(meta.tx.nonce),
            handle,
        }
    }
}

/// One of the three ordered sub-pools.
///
/// Entries are kept in a balanced-order set keyed by [`OrderKey`], giving
/// O(log n) insert, removal and min/max. The sub-pool records itself as the
/// entry's location in the arena so that an entry is in exactly one sub-pool
/// at any observable point.
#[derive(Debug)]
pub struct SubPool {
    kind: SubPoolKind,
    entries: BTreeSet<OrderKey>,
}

impl SubPool {
    /// Create an empty sub-pool of the given identity.
    pub fn new(kind: SubPoolKind) -> Self {
        Self {
            kind,
            entries: BTreeSet::new(),
        }
    }

    /// Which of the three sub-pools this is.
    pub fn kind(&self) -> SubPoolKind {
        self.kind
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the sub-pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry, keyed by its current marker and tip.
    ///
    /// The entry must not currently be in any sub-pool.
    pub fn add(&mut self, arena: &mut TxArena, handle: TxHandle) {
        debug_assert!(arena[handle].location.is_none(), "entry already pooled");
        let inserted = self.entries.insert(OrderKey::of(arena, handle));
        debug_assert!(inserted, "duplicate entry in sub-pool");
        arena[handle].location = Some(self.kind);
    }

    /// Remove an entry by identity. Returns whether it was present.
    pub fn remove(&mut self, arena: &mut TxArena, handle: TxHandle) -> bool {
        let removed = self.entries.remove(&OrderKey::of(arena, handle));
        if removed {
            arena[handle].location = None;
        }
        removed
    }

    /// The highest-ranked entry, if any. Does not mutate.
    pub fn best(&self) -> Option<TxHandle> {
        self.entries.last().map(|k| k.handle)
    }

    /// The lowest-ranked entry, if any. Does not mutate.
    pub fn worst(&self) -> Option<TxHandle> {
        self.entries.first().map(|k| k.handle)
    }

    /// Remove and return the highest-ranked entry.
    pub fn pop_best(&mut self, arena: &mut TxArena) -> Option<TxHandle> {
        let key = self.entries.pop_last()?;
        arena[key.handle].location = None;
        Some(key.handle)
    }

    /// Remove and return the lowest-ranked entry.
    pub fn pop_worst(&mut self, arena: &mut TxArena) -> Option<TxHandle> {
        let key = self.entries.pop_first()?;
        arena[key.handle].location = None;
        Some(key.handle)
    }

    /// Reposition an entry after its marker was mutated externally.
    ///
    /// `prev_marker` is the marker the entry carried when it was inserted.
    /// Equivalent to remove + add but keeps the location untouched.
    pub fn reorder(&mut self, arena: &TxArena, handle: TxHandle, prev_marker: SubPoolMarker) {
        let meta = &arena[handle];
        let old_key = OrderKey {
            marker: prev_marker,
            tip: meta.tx.tip,
            sender: Reverse(meta.tx.sender),
            nonce: Reverse(meta.tx.nonce),
            handle,
        };
        let removed = self.entries.remove(&old_key);
        debug_assert!(removed, "reorder of entry not in sub-pool");
        self.entries.insert(OrderKey::of(arena, handle));
    }

    /// Visit every entry exactly once, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = TxHandle> + '_ {
        self.entries.iter().map(|k| k.handle)
    }
}
