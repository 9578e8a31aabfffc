//! Pool configuration.

/// Default capacity of each sub-pool.
pub const DEFAULT_SUB_POOL_LIMIT: usize = 1024;

/// Capacity limits for the three sub-pools.
///
/// When a sub-pool exceeds its limit, its worst entries are destroyed until
/// it is back at the limit. Evicted entries never cascade into a lower pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum entries in the pending sub-pool.
    pub pending_limit: usize,
    /// Maximum entries in the baseFee sub-pool.
    pub base_fee_limit: usize,
    /// Maximum entries in the queued sub-pool.
    pub queued_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pending_limit: DEFAULT_SUB_POOL_LIMIT,
            base_fee_limit: DEFAULT_SUB_POOL_LIMIT,
            queued_limit: DEFAULT_SUB_POOL_LIMIT,
        }
    }
}

impl PoolConfig {
    /// Set the pending sub-pool limit.
    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.pending_limit = limit;
        self
    }

    /// Set the baseFee sub-pool limit.
    pub fn with_base_fee_limit(mut self, limit: usize) -> Self {
        self.base_fee_limit = limit;
        self
    }

    /// Set the queued sub-pool limit.
    pub fn with_queued_limit(mut self, limit: usize) -> Self {
        self.queued_limit = limit;
        self
    }
}
