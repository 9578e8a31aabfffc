//! Wire formats for the state-commitment collaborator.
//!
//! The admission core consumes committed account state produced by a
//! hex-patricia commitment subsystem. This crate carries that subsystem's
//! bit-exact serialization formats and the narrow store interfaces the two
//! sides share:
//!
//! - [`StateUpdate`]: the flagged account/storage update record, plus the
//!   flag-less storage-layer account encoding
//! - [`BranchData`]: a branch node update batch (touch/after maps and
//!   per-child records) with an associative merge
//! - [`BranchReader`] / [`BranchWriter`]: keyed access to branch data by
//!   byte-string prefix
//! - [`MemoryCommitmentStore`]: an in-memory implementation backing the
//!   round-trip test harness
//!
//! Decoders reject buffer underrun at any field, varints past ten bytes,
//! and trailing bytes; no partial state is committed on a decode error.

mod branch;
mod builder;
mod error;
mod store;
mod update;
mod varint;

pub use branch::{BranchData, ChildRef};
pub use builder::UpdateBatch;
pub use error::DecodeError;
pub use store::{BranchReader, BranchWriter, MemoryCommitmentStore, StoreError};
pub use update::{StateUpdate, UpdateFlags};
