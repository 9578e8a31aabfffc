//! The immutable record of a submitted transaction.

use crate::SenderId;
use alloy_primitives::U256;

/// A submitted transaction, as seen by the admission core.
///
/// Signature validation and sender recovery happen upstream; by the time a
/// slot reaches the pool its [`SenderId`] is authoritative. The slot is
/// immutable for its lifetime in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSlot {
    /// Sender resolved from signature recovery.
    pub sender: SenderId,
    /// Per-sender sequence number.
    pub nonce: u64,
    /// Priority fee offered above the base fee.
    pub tip: u64,
    /// Maximum total fee per gas the submitter will pay.
    pub fee_cap: u64,
    /// Gas limit.
    pub gas: u64,
    /// Transferred value.
    pub value: U256,
}

impl TxSlot {
    /// Worst-case cost of executing this transaction: `gas * fee_cap + value`.
    ///
    /// The per-sender balance predicate sums this over all of a sender's
    /// pooled transactions in ascending nonce order. The product of two u64s
    /// cannot overflow 256 bits; the addition saturates at `U256::MAX`.
    pub fn cost(&self) -> U256 {
        let gas_cost = U256::from(self.gas) * U256::from(self.fee_cap);
        gas_cost.saturating_add(self.value)
    }
}
