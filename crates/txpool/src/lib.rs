//! Transaction admission and prioritization core.
//!
//! This crate implements the pool as a pure, synchronous state machine. It
//! handles:
//!
//! - Transaction submission (local and remote)
//! - Classification of every entry by five qualification predicates
//! - Partitioning across three ordered sub-pools (`pending`, `baseFee`,
//!   `queued`)
//! - Re-evaluation on block events and account-state changes
//! - Per-pool capacity enforcement by global-worst eviction
//!
//! # Architecture
//!
//! ```text
//! block events / submissions → TxPool → entries move between SubPools
//! ```
//!
//! Every pool entry carries a [`SubPoolMarker`]: a packed five-bit
//! classification whose unsigned numeric order is the pool's priority order.
//! Entries live in a handle-indexed arena ([`TxArena`]); the sub-pools and
//! the per-sender nonce maps hold handles only, so no ownership cycle exists
//! between senders and entries.
//!
//! All mutation is serialized through a single logical executor: no locks,
//! no async. A block-handler invocation is atomic — once begun it runs to
//! completion.

mod arena;
mod config;
mod marker;
mod pool;
mod subpool;

pub use arena::{MetaTx, TxArena, TxHandle};
pub use config::{PoolConfig, DEFAULT_SUB_POOL_LIMIT};
pub use marker::{SubPoolKind, SubPoolMarker};
pub use pool::{promote_step, AdmissionError, BlockUpdate, PoolStats, SenderInfo, TxPool};
pub use subpool::SubPool;
