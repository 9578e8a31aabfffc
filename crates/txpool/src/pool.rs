//! The pool orchestrator: classification, block handling, promotion and
//! capacity enforcement.

use crate::arena::{MetaTx, TxArena, TxHandle};
use crate::config::PoolConfig;
use crate::marker::{SubPoolKind, SubPoolMarker};
use crate::subpool::SubPool;
use alloy_primitives::U256;
use lodestone_types::{AccountInfo, AccountReader, SenderId, TxSlot};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::instrument;

/// A submission the pool refused. Pool state is unchanged on rejection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// The transaction can never be admitted: it does not pay the protocol
    /// base fee.
    #[error("{sender} nonce {nonce}: fee cap {fee_cap} below protocol base fee {protocol_base_fee}")]
    FeeCapBelowProtocol {
        sender: SenderId,
        nonce: u64,
        fee_cap: u64,
        protocol_base_fee: u64,
    },

    /// The nonce is already committed for this sender.
    #[error("{sender} nonce {nonce} is below committed nonce {account_nonce}")]
    StaleNonce {
        sender: SenderId,
        nonce: u64,
        account_nonce: u64,
    },

    /// A `(sender, nonce)` pair may only be replaced by a strictly higher tip.
    #[error("{sender} nonce {nonce}: replacement tip {new_tip} does not exceed existing tip {old_tip}")]
    UnderpricedReplacement {
        sender: SenderId,
        nonce: u64,
        old_tip: u64,
        new_tip: u64,
    },
}

/// Per-sender state viewed by the pool.
#[derive(Debug)]
pub struct SenderInfo {
    /// Committed nonce as of the latest applied block.
    pub nonce: u64,
    /// Committed balance.
    pub balance: U256,
    /// This sender's pooled entries, ascending by nonce. Lookup handles
    /// only; the arena owns the entries.
    txs: BTreeMap<u64, TxHandle>,
}

impl SenderInfo {
    /// Snapshot for a sender the committed state has never seen. Entries
    /// admitted under it typically classify into `queued` until the real
    /// snapshot arrives.
    fn placeholder() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            txs: BTreeMap::new(),
        }
    }

    /// Handle of this sender's entry at `nonce`, if pooled.
    pub fn tx_at(&self, nonce: u64) -> Option<TxHandle> {
        self.txs.get(&nonce).copied()
    }

    /// This sender's pooled `(nonce, handle)` pairs in ascending nonce order.
    pub fn txs(&self) -> impl Iterator<Item = (u64, TxHandle)> + '_ {
        self.txs.iter().map(|(&n, &h)| (n, h))
    }

    /// Number of pooled entries for this sender.
    pub fn tx_count(&self) -> usize {
        self.txs.len()
    }
}

/// Everything a new-block event delivers to the pool.
#[derive(Debug, Default)]
pub struct BlockUpdate {
    /// Refreshed snapshots for every sender whose account changed.
    pub changed_accounts: Vec<(SenderId, AccountInfo)>,
    /// `(sender, nonce)` of every transaction committed in the new blocks.
    pub committed: Vec<(SenderId, u64)>,
    /// Transactions that arrived with the block event.
    pub new_txs: Vec<TxSlot>,
    /// New protocol base fee.
    pub protocol_base_fee: u64,
    /// New block base fee.
    pub block_base_fee: u64,
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Entries in the pending sub-pool.
    pub pending: usize,
    /// Entries in the baseFee sub-pool.
    pub base_fee: usize,
    /// Entries in the queued sub-pool.
    pub queued: usize,
    /// Tracked senders.
    pub senders: usize,
}

impl PoolStats {
    /// Total entries across the three sub-pools.
    pub fn total(&self) -> usize {
        self.pending + self.base_fee + self.queued
    }
}

/// One step of a per-sender chain scan.
enum ChainStep {
    /// Entry nonce is below the committed account nonce; destroy it.
    Stale(TxHandle),
    /// Freshly computed classification for a live entry.
    Mark {
        handle: TxHandle,
        marker: SubPoolMarker,
        enough_balance: bool,
    },
}

/// The transaction pool.
///
/// Owns the entry arena, the sender snapshot map and the three sub-pools.
/// All mutation goes through a single logical executor; a block-handler
/// invocation is atomic and runs to completion.
#[derive(Debug)]
pub struct TxPool {
    config: PoolConfig,
    arena: TxArena,
    senders: HashMap<SenderId, SenderInfo>,
    pending: SubPool,
    base_fee: SubPool,
    queued: SubPool,
    protocol_base_fee: u64,
    block_base_fee: u64,
}

impl TxPool {
    /// Create an empty pool with the given limits and initial base fees.
    pub fn new(config: PoolConfig, protocol_base_fee: u64, block_base_fee: u64) -> Self {
        Self {
            config,
            arena: TxArena::new(),
            senders: HashMap::new(),
            pending: SubPool::new(SubPoolKind::Pending),
            base_fee: SubPool::new(SubPoolKind::BaseFee),
            queued: SubPool::new(SubPoolKind::Queued),
            protocol_base_fee,
            block_base_fee,
        }
    }

    /// Submit a transaction that originated on this node.
    #[instrument(skip(self, tx), fields(sender = %tx.sender, nonce = tx.nonce))]
    pub fn add_local(&mut self, tx: TxSlot) -> Result<(), AdmissionError> {
        self.admit(tx, true)?;
        self.enforce_capacity();
        Ok(())
    }

    /// Submit a transaction received from a peer.
    #[instrument(skip(self, tx), fields(sender = %tx.sender, nonce = tx.nonce))]
    pub fn add_remote(&mut self, tx: TxSlot) -> Result<(), AdmissionError> {
        self.admit(tx, false)?;
        self.enforce_capacity();
        Ok(())
    }

    /// Apply a block event.
    ///
    /// Order within one invocation: committed removals, then snapshot
    /// updates and re-marking, then ingest of new arrivals, then one
    /// promotion step, then capacity enforcement. Callers must deliver
    /// block events in block-height order.
    #[instrument(skip(self, update), fields(
        changed = update.changed_accounts.len(),
        committed = update.committed.len(),
        arrived = update.new_txs.len(),
    ))]
    pub fn on_new_blocks(&mut self, update: BlockUpdate) {
        // 1. Committed transactions leave the pool. Their senders are
        //    re-marked below even if the caller's snapshot diff missed them.
        let mut dirty: Vec<SenderId> = Vec::with_capacity(update.changed_accounts.len());
        for (sender, nonce) in &update.committed {
            let handle = self
                .senders
                .get(sender)
                .and_then(|info| info.tx_at(*nonce));
            if let Some(handle) = handle {
                self.discard(handle, "committed in block");
                dirty.push(*sender);
            }
        }

        // 2. Snapshot updates, then re-marking. A base fee change flips the
        //    fee predicates on every entry, so the rescan widens to all
        //    senders in that case.
        let fees_changed = update.protocol_base_fee != self.protocol_base_fee
            || update.block_base_fee != self.block_base_fee;
        self.protocol_base_fee = update.protocol_base_fee;
        self.block_base_fee = update.block_base_fee;

        for (sender, account) in update.changed_accounts {
            let info = self
                .senders
                .entry(sender)
                .or_insert_with(SenderInfo::placeholder);
            info.nonce = account.nonce;
            info.balance = account.balance;
            dirty.push(sender);
        }
        if fees_changed {
            dirty = self.senders.keys().copied().collect();
        }
        dirty.sort_unstable();
        dirty.dedup();
        for sender in dirty {
            self.rescan_sender(sender);
        }

        // 3. Transactions that arrived with the block event.
        for tx in update.new_txs {
            if let Err(err) = self.admit(tx, false) {
                tracing::debug!(%err, "arrival rejected");
            }
        }

        // 4. One promotion step across the three sub-pools.
        let dropped = promote_step(
            &mut self.arena,
            &mut self.pending,
            &mut self.base_fee,
            &mut self.queued,
        );
        for meta in dropped {
            if let Some(info) = self.senders.get_mut(&meta.tx.sender) {
                info.txs.remove(&meta.tx.nonce);
            }
        }

        // 5. Capacity, highest-priority pool first.
        self.enforce_capacity();

        tracing::debug!(
            pending = self.pending.len(),
            base_fee = self.base_fee.len(),
            queued = self.queued.len(),
            "block event applied"
        );
    }

    /// Refresh every tracked sender's snapshot through the account reader.
    ///
    /// A failed read keeps the previous snapshot; the affected entries are
    /// reclassified when the reader next succeeds.
    #[instrument(skip(self, reader))]
    pub fn refresh_senders<R: AccountReader>(&mut self, reader: &R) {
        let ids: Vec<SenderId> = self.senders.keys().copied().collect();
        let mut refreshed = Vec::with_capacity(ids.len());
        for id in ids {
            match reader.account(id) {
                Ok(Some(account)) => {
                    if let Some(info) = self.senders.get_mut(&id) {
                        info.nonce = account.nonce;
                        info.balance = account.balance;
                        refreshed.push(id);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(sender = %id, %err, "account read failed, keeping last snapshot");
                }
            }
        }
        for id in refreshed {
            self.rescan_sender(id);
        }
        let dropped = promote_step(
            &mut self.arena,
            &mut self.pending,
            &mut self.base_fee,
            &mut self.queued,
        );
        for meta in dropped {
            if let Some(info) = self.senders.get_mut(&meta.tx.sender) {
                info.txs.remove(&meta.tx.nonce);
            }
        }
        self.enforce_capacity();
    }

    /// The pending sub-pool.
    pub fn pending(&self) -> &SubPool {
        &self.pending
    }

    /// The baseFee sub-pool.
    pub fn base_fee(&self) -> &SubPool {
        &self.base_fee
    }

    /// The queued sub-pool.
    pub fn queued(&self) -> &SubPool {
        &self.queued
    }

    /// Borrow a pooled entry.
    pub fn meta(&self, handle: TxHandle) -> Option<&MetaTx> {
        self.arena.get(handle)
    }

    /// Borrow a tracked sender's snapshot.
    pub fn sender(&self, id: SenderId) -> Option<&SenderInfo> {
        self.senders.get(&id)
    }

    /// Total number of pooled entries.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Current protocol base fee.
    pub fn protocol_base_fee(&self) -> u64 {
        self.protocol_base_fee
    }

    /// Current block base fee.
    pub fn block_base_fee(&self) -> u64 {
        self.block_base_fee
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pending: self.pending.len(),
            base_fee: self.base_fee.len(),
            queued: self.queued.len(),
            senders: self.senders.len(),
        }
    }

    /// Validate admission and place the entry; capacity is the caller's job.
    fn admit(&mut self, tx: TxSlot, is_local: bool) -> Result<TxHandle, AdmissionError> {
        if tx.fee_cap < self.protocol_base_fee {
            return Err(AdmissionError::FeeCapBelowProtocol {
                sender: tx.sender,
                nonce: tx.nonce,
                fee_cap: tx.fee_cap,
                protocol_base_fee: self.protocol_base_fee,
            });
        }

        let sender_id = tx.sender;
        let nonce = tx.nonce;
        let info = self.senders.entry(sender_id).or_insert_with(|| {
            tracing::debug!(sender = %sender_id, "unknown sender, starting from placeholder snapshot");
            SenderInfo::placeholder()
        });
        if nonce < info.nonce {
            return Err(AdmissionError::StaleNonce {
                sender: sender_id,
                nonce,
                account_nonce: info.nonce,
            });
        }

        if let Some(&existing) = info.txs.get(&nonce) {
            let old_tip = self.arena[existing].tx.tip;
            if tx.tip <= old_tip {
                return Err(AdmissionError::UnderpricedReplacement {
                    sender: sender_id,
                    nonce,
                    old_tip,
                    new_tip: tx.tip,
                });
            }
            tracing::debug!(
                sender = %sender_id,
                nonce,
                old_tip,
                new_tip = tx.tip,
                "replacing entry with higher tip"
            );
            if let Some(kind) = self.arena[existing].location {
                pool_of(&mut self.pending, &mut self.base_fee, &mut self.queued, kind)
                    .remove(&mut self.arena, existing);
            }
            self.arena.remove(existing);
        }

        let handle = self.arena.insert(MetaTx::new(tx, is_local));
        self.senders
            .get_mut(&sender_id)
            .expect("sender inserted above")
            .txs
            .insert(nonce, handle);
        self.rescan_sender(sender_id);
        Ok(handle)
    }

    /// Compute classifications for one sender's chain against the current
    /// snapshot and base fees. Read-only; shared by the rescan and the
    /// invariant checker.
    fn chain_markers(&self, id: SenderId) -> Vec<ChainStep> {
        let Some(info) = self.senders.get(&id) else {
            return Vec::new();
        };
        let account_nonce = info.nonce;
        let balance = info.balance;

        let mut steps = Vec::with_capacity(info.txs.len());
        let mut cumulative = U256::ZERO;
        let mut expected = account_nonce;
        let mut gapless = true;
        for (nonce, handle) in info.txs() {
            if nonce < account_nonce {
                steps.push(ChainStep::Stale(handle));
                continue;
            }
            if nonce != expected {
                gapless = false;
            }
            expected = nonce.saturating_add(1);

            let meta = &self.arena[handle];
            cumulative = cumulative.saturating_add(meta.tx.cost());
            let enough_balance = cumulative <= balance;
            let marker = SubPoolMarker::new(
                meta.tx.fee_cap >= self.protocol_base_fee,
                gapless,
                enough_balance,
                meta.tx.fee_cap >= self.block_base_fee,
                meta.is_local,
            );
            steps.push(ChainStep::Mark {
                handle,
                marker,
                enough_balance,
            });
        }
        steps
    }

    /// Recompute one sender's chain and move entries to where their markers
    /// say they belong. Stale entries are destroyed.
    fn rescan_sender(&mut self, id: SenderId) {
        for step in self.chain_markers(id) {
            match step {
                ChainStep::Stale(handle) => {
                    self.discard(handle, "nonce below committed account nonce");
                }
                ChainStep::Mark {
                    handle,
                    marker,
                    enough_balance,
                } => self.relocate(handle, marker, enough_balance),
            }
        }
    }

    /// Apply a freshly computed marker to an entry, repositioning it within
    /// its sub-pool or moving it to the one its classification names.
    fn relocate(&mut self, handle: TxHandle, marker: SubPoolMarker, enough_balance: bool) {
        let (prev_marker, location) = {
            let meta = &self.arena[handle];
            (meta.sub_pool, meta.location)
        };
        let target = marker.classify();

        // Detach from the wrong pool while the stored key still matches the
        // old marker.
        if let Some(current) = location {
            if current != target {
                pool_of(&mut self.pending, &mut self.base_fee, &mut self.queued, current)
                    .remove(&mut self.arena, handle);
            }
        }

        {
            let meta = &mut self.arena[handle];
            meta.sub_pool = marker;
            meta.sender_has_enough_balance = enough_balance;
        }

        match location {
            Some(current) if current == target => {
                if prev_marker != marker {
                    pool_of(&mut self.pending, &mut self.base_fee, &mut self.queued, current)
                        .reorder(&self.arena, handle, prev_marker);
                }
            }
            _ => {
                pool_of(&mut self.pending, &mut self.base_fee, &mut self.queued, target)
                    .add(&mut self.arena, handle);
                if location.is_some() {
                    tracing::trace!(from = %location.unwrap_or(target), to = %target, marker = %marker, "entry moved");
                }
            }
        }
    }

    /// Destroy an entry: detach from its sub-pool, unlink from its sender
    /// and free the arena slot.
    fn discard(&mut self, handle: TxHandle, reason: &'static str) {
        let Some(location) = self.arena.get(handle).map(|m| m.location) else {
            return;
        };
        if let Some(kind) = location {
            pool_of(&mut self.pending, &mut self.base_fee, &mut self.queued, kind)
                .remove(&mut self.arena, handle);
        }
        let Some(meta) = self.arena.remove(handle) else {
            return;
        };
        if let Some(info) = self.senders.get_mut(&meta.tx.sender) {
            info.txs.remove(&meta.tx.nonce);
        }
        tracing::debug!(sender = %meta.tx.sender, nonce = meta.tx.nonce, reason, "entry dropped");
    }

    /// Trim each sub-pool to its limit, worst entries first. Evicted entries
    /// are destroyed, never demoted.
    ///
    /// An eviction can open a nonce gap in the middle of a surviving chain,
    /// so affected senders are re-marked and the trim repeats until no pool
    /// is over its limit. Re-marking after an eviction only ever moves
    /// entries downward, so the loop strictly shrinks the pool and
    /// terminates.
    fn enforce_capacity(&mut self) {
        loop {
            let mut evicted_senders: Vec<SenderId> = Vec::new();
            for (kind, limit) in [
                (SubPoolKind::Pending, self.config.pending_limit),
                (SubPoolKind::BaseFee, self.config.base_fee_limit),
                (SubPoolKind::Queued, self.config.queued_limit),
            ] {
                loop {
                    let pool =
                        pool_of(&mut self.pending, &mut self.base_fee, &mut self.queued, kind);
                    if pool.len() <= limit {
                        break;
                    }
                    let Some(handle) = pool.pop_worst(&mut self.arena) else {
                        break;
                    };
                    let Some(meta) = self.arena.remove(handle) else {
                        continue;
                    };
                    if let Some(info) = self.senders.get_mut(&meta.tx.sender) {
                        info.txs.remove(&meta.tx.nonce);
                    }
                    evicted_senders.push(meta.tx.sender);
                    tracing::debug!(
                        pool = %kind,
                        sender = %meta.tx.sender,
                        nonce = meta.tx.nonce,
                        "evicted over capacity"
                    );
                }
            }
            if evicted_senders.is_empty() {
                break;
            }
            evicted_senders.sort_unstable();
            evicted_senders.dedup();
            for sender in evicted_senders {
                self.rescan_sender(sender);
            }
        }
    }

    /// Check every cross-structure invariant, panicking on violation.
    ///
    /// Violations indicate a bug in the pool, not bad input; tests call this
    /// after every handler invocation.
    pub fn assert_invariants(&self) {
        // Each sub-pool's members point back at it, floors hold, and
        // best/worst/len agree on emptiness.
        let mut located = 0usize;
        for pool in [&self.pending, &self.base_fee, &self.queued] {
            assert_eq!(pool.best().is_none(), pool.is_empty());
            assert_eq!(pool.worst().is_none(), pool.is_empty());
            if let Some(worst) = pool.worst() {
                assert!(
                    self.arena[worst].sub_pool >= pool.kind().floor(),
                    "{} worst {} below floor {}",
                    pool.kind(),
                    self.arena[worst].sub_pool,
                    pool.kind().floor(),
                );
            }
            for handle in pool.iter() {
                assert_eq!(self.arena[handle].location, Some(pool.kind()));
                located += 1;
            }
        }
        assert_eq!(located, self.arena.len(), "entry outside any sub-pool");

        // Limits.
        assert!(self.pending.len() <= self.config.pending_limit);
        assert!(self.base_fee.len() <= self.config.base_fee_limit);
        assert!(self.queued.len() <= self.config.queued_limit);

        // Sender map and arena agree, nonces are not stale, and markers
        // match a fresh classification.
        let mut indexed = 0usize;
        for (&id, info) in &self.senders {
            for (nonce, handle) in info.txs() {
                let meta = &self.arena[handle];
                assert_eq!(meta.tx.sender, id);
                assert_eq!(meta.tx.nonce, nonce);
                assert!(meta.tx.nonce >= info.nonce, "stale entry survived rescan");
                indexed += 1;
            }
            let mut balance_ok = true;
            for step in self.chain_markers(id) {
                match step {
                    ChainStep::Stale(_) => panic!("stale entry survived rescan"),
                    ChainStep::Mark {
                        handle,
                        marker,
                        enough_balance,
                    } => {
                        let meta = &self.arena[handle];
                        assert_eq!(
                            meta.sub_pool, marker,
                            "marker out of date for {} nonce {}",
                            id, meta.tx.nonce
                        );
                        assert_eq!(meta.location, Some(marker.classify()));
                        // Once the balance predicate flips false it must
                        // stay false for higher nonces.
                        if !balance_ok {
                            assert!(!enough_balance, "balance predicate not monotonic");
                        }
                        balance_ok = enough_balance;
                    }
                }
            }
        }
        assert_eq!(indexed, self.arena.len(), "entry missing from sender map");
    }
}

/// Select one of the three sub-pools by identity.
fn pool_of<'a>(
    pending: &'a mut SubPool,
    base_fee: &'a mut SubPool,
    queued: &'a mut SubPool,
    kind: SubPoolKind,
) -> &'a mut SubPool {
    match kind {
        SubPoolKind::Pending => pending,
        SubPoolKind::BaseFee => base_fee,
        SubPoolKind::Queued => queued,
    }
}

/// One promotion step across the three sub-pools.
///
/// Pops each pool's worst entry while its marker is below that pool's floor.
/// Popped entries fall through to the highest pool whose floor they meet;
/// entries below every floor are destroyed and returned so the caller can
/// unlink them from its sender map.
///
/// Takes the parts by reference so the step can be exercised in isolation.
pub fn promote_step(
    arena: &mut TxArena,
    pending: &mut SubPool,
    base_fee: &mut SubPool,
    queued: &mut SubPool,
) -> Vec<MetaTx> {
    let mut dropped = Vec::new();

    while let Some(worst) = pending.worst() {
        let marker = arena[worst].sub_pool;
        if marker >= SubPoolMarker::PENDING_FLOOR {
            break;
        }
        pending.pop_worst(arena);
        if marker >= SubPoolMarker::BASE_FEE_FLOOR {
            base_fee.add(arena, worst);
        } else if marker >= SubPoolMarker::QUEUED_FLOOR {
            queued.add(arena, worst);
        } else if let Some(meta) = arena.remove(worst) {
            dropped.push(meta);
        }
    }

    while let Some(worst) = base_fee.worst() {
        let marker = arena[worst].sub_pool;
        if marker >= SubPoolMarker::BASE_FEE_FLOOR {
            break;
        }
        base_fee.pop_worst(arena);
        if marker >= SubPoolMarker::QUEUED_FLOOR {
            queued.add(arena, worst);
        } else if let Some(meta) = arena.remove(worst) {
            dropped.push(meta);
        }
    }

    while let Some(worst) = queued.worst() {
        if arena[worst].sub_pool >= SubPoolMarker::QUEUED_FLOOR {
            break;
        }
        queued.pop_worst(arena);
        if let Some(meta) = arena.remove(worst) {
            dropped.push(meta);
        }
    }

    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTO_FEE: u64 = 10;
    const BLOCK_FEE: u64 = 50;

    fn tx(sender: u64, nonce: u64, tip: u64, fee_cap: u64) -> TxSlot {
        TxSlot {
            sender: SenderId(sender),
            nonce,
            tip,
            fee_cap,
            gas: 21_000,
            value: U256::ZERO,
        }
    }

    fn pool_with_sender(sender: u64, nonce: u64, balance: u64) -> TxPool {
        let mut pool = TxPool::new(PoolConfig::default(), PROTO_FEE, BLOCK_FEE);
        pool.on_new_blocks(BlockUpdate {
            changed_accounts: vec![(
                SenderId(sender),
                AccountInfo {
                    nonce,
                    balance: U256::from(balance),
                    ..AccountInfo::empty()
                },
            )],
            protocol_base_fee: PROTO_FEE,
            block_base_fee: BLOCK_FEE,
            ..BlockUpdate::default()
        });
        pool
    }

    #[test]
    fn rejects_fee_cap_below_protocol_base_fee() {
        let mut pool = TxPool::new(PoolConfig::default(), PROTO_FEE, BLOCK_FEE);
        let err = pool.add_remote(tx(1, 0, 1, PROTO_FEE - 1)).unwrap_err();
        assert!(matches!(err, AdmissionError::FeeCapBelowProtocol { .. }));
        assert!(pool.is_empty());
    }

    #[test]
    fn rejects_stale_nonce() {
        let mut pool = pool_with_sender(1, 5, u64::MAX);
        let err = pool.add_remote(tx(1, 4, 1, 100)).unwrap_err();
        assert_eq!(
            err,
            AdmissionError::StaleNonce {
                sender: SenderId(1),
                nonce: 4,
                account_nonce: 5,
            }
        );
    }

    #[test]
    fn replacement_requires_strictly_higher_tip() {
        let mut pool = pool_with_sender(1, 0, u64::MAX);
        pool.add_remote(tx(1, 0, 5, 100)).unwrap();

        let equal = pool.add_remote(tx(1, 0, 5, 100)).unwrap_err();
        assert!(matches!(equal, AdmissionError::UnderpricedReplacement { .. }));
        let lower = pool.add_remote(tx(1, 0, 4, 100)).unwrap_err();
        assert!(matches!(lower, AdmissionError::UnderpricedReplacement { .. }));

        pool.add_remote(tx(1, 0, 6, 100)).unwrap();
        assert_eq!(pool.len(), 1);
        let handle = pool.sender(SenderId(1)).unwrap().tx_at(0).unwrap();
        assert_eq!(pool.meta(handle).unwrap().tx.tip, 6);
        pool.assert_invariants();
    }

    #[test]
    fn unknown_sender_is_accepted_with_placeholder_snapshot() {
        let mut pool = TxPool::new(PoolConfig::default(), PROTO_FEE, BLOCK_FEE);
        pool.add_remote(tx(9, 3, 1, 100)).unwrap();

        // nonce 3 against placeholder nonce 0 is a gap, and balance 0 fails
        // the balance predicate, so the entry waits in queued.
        assert_eq!(pool.queued().len(), 1);
        let handle = pool.sender(SenderId(9)).unwrap().tx_at(3).unwrap();
        let meta = pool.meta(handle).unwrap();
        assert!(!meta.sender_has_enough_balance);
        assert!(!meta.sub_pool.has(SubPoolMarker::NO_NONCE_GAP));
        pool.assert_invariants();
    }

    #[test]
    fn local_flag_sets_the_authority_bit() {
        let mut pool = pool_with_sender(1, 0, u64::MAX);
        pool.add_local(tx(1, 0, 1, 100)).unwrap();
        let handle = pool.sender(SenderId(1)).unwrap().tx_at(0).unwrap();
        assert!(pool.meta(handle).unwrap().sub_pool.has(SubPoolMarker::IS_LOCAL));
    }

    #[test]
    fn promote_step_restores_floors_by_falling_through() {
        let mut arena = TxArena::new();
        let mut pending = SubPool::new(SubPoolKind::Pending);
        let mut base_fee = SubPool::new(SubPoolKind::BaseFee);
        let mut queued = SubPool::new(SubPoolKind::Queued);

        let seed = [0b11000u8, 0b00101, 0b00111, 0b11111, 0b10011];
        for pool in [&mut pending, &mut base_fee, &mut queued] {
            for (i, bits) in seed.iter().enumerate() {
                let mut meta = MetaTx::new(tx(pool.kind() as u64 * 10 + i as u64, 0, 1, 100), false);
                meta.sub_pool = SubPoolMarker::from_bits(*bits);
                let h = arena.insert(meta);
                pool.add(&mut arena, h);
            }
        }

        let dropped = promote_step(&mut arena, &mut pending, &mut base_fee, &mut queued);

        for (pool, floor) in [
            (&pending, SubPoolMarker::PENDING_FLOOR),
            (&base_fee, SubPoolMarker::BASE_FEE_FLOOR),
            (&queued, SubPoolMarker::QUEUED_FLOOR),
        ] {
            if let Some(worst) = pool.worst() {
                assert!(arena[worst].sub_pool >= floor);
            }
        }
        // 0b00101 and 0b00111 from every pool are below the queued floor.
        assert_eq!(dropped.len(), 6);
        assert_eq!(
            arena.len(),
            pending.len() + base_fee.len() + queued.len()
        );
    }

    #[test]
    fn committed_transactions_leave_the_pool() {
        let mut pool = pool_with_sender(1, 0, u64::MAX);
        pool.add_remote(tx(1, 0, 1, 100)).unwrap();
        pool.add_remote(tx(1, 1, 1, 100)).unwrap();
        assert_eq!(pool.pending().len(), 2);

        pool.on_new_blocks(BlockUpdate {
            changed_accounts: vec![(
                SenderId(1),
                AccountInfo {
                    nonce: 1,
                    balance: U256::MAX,
                    ..AccountInfo::empty()
                },
            )],
            committed: vec![(SenderId(1), 0)],
            protocol_base_fee: PROTO_FEE,
            block_base_fee: BLOCK_FEE,
            ..BlockUpdate::default()
        });

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pending().len(), 1);
        pool.assert_invariants();
    }

    #[test]
    fn stale_entries_are_destroyed_on_snapshot_advance() {
        let mut pool = pool_with_sender(1, 0, u64::MAX);
        for n in 0..3 {
            pool.add_remote(tx(1, n, 1, 100)).unwrap();
        }

        // The account nonce jumps past the first two entries without them
        // being committed through the pool (e.g. mined elsewhere).
        pool.on_new_blocks(BlockUpdate {
            changed_accounts: vec![(
                SenderId(1),
                AccountInfo {
                    nonce: 2,
                    balance: U256::MAX,
                    ..AccountInfo::empty()
                },
            )],
            protocol_base_fee: PROTO_FEE,
            block_base_fee: BLOCK_FEE,
            ..BlockUpdate::default()
        });

        assert_eq!(pool.len(), 1);
        let info = pool.sender(SenderId(1)).unwrap();
        assert!(info.tx_at(2).is_some());
        pool.assert_invariants();
    }

    #[test]
    fn reader_failure_keeps_last_snapshot() {
        use lodestone_types::test_utils::MemoryAccountReader;

        let mut pool = pool_with_sender(1, 0, 10_000_000);
        pool.add_remote(tx(1, 0, 1, 100)).unwrap();

        let mut reader = MemoryAccountReader::new();
        reader.fail_with = Some("backend down".into());
        pool.refresh_senders(&reader);

        // Snapshot unchanged, entry still classified against it.
        assert_eq!(pool.sender(SenderId(1)).unwrap().balance, U256::from(10_000_000u64));
        pool.assert_invariants();

        reader.fail_with = None;
        reader.put(SenderId(1), 1, U256::ZERO);
        pool.refresh_senders(&reader);
        // nonce 0 is now stale and gone; the snapshot itself is retained.
        assert!(pool.is_empty());
        assert_eq!(pool.sender(SenderId(1)).unwrap().nonce, 1);
    }
}
