//! Priority-indexed request storage and timeout tracking over an ordered key-value store.
//!
//! The engine persists everything through the [kv::Kv] trait, an ordered map
//! from byte keys to byte values. Typed [collection]s carve that keyspace into
//! disjoint prefixes and encode keys so that byte order equals logical order.
//!
//! Two coordinating types are built on top:
//!
//! - [requests::RequestIndexStore]: the primary request map, a `(status,
//!   index)` key set used for fee-ordered pagination, and a per-status counter
//!   for constant-time totals.
//! - [timeouts::TimeoutQueue]: a `(timeout height, request id)` key set
//!   drained at every block boundary.
//!
//! Mutations are staged in a [kv::Batch] and applied with [kv::transact]: if
//! any step of an operation fails, nothing it staged reaches the store.
//!
//! # Status
//!
//! `oracle-store` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

pub mod collection;
pub mod kv;
pub mod requests;
pub mod timeouts;

use oracle_primitives::{DataRequestIndex, RequestId, Status};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum Error {
    #[error("codec error: {0}")]
    Codec(#[from] commonware_codec::Error),
    #[error("trailing bytes after value")]
    TrailingBytes,
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("data request not found: {0}")]
    NotFound(RequestId),
    #[error("data request already exists: {0}")]
    AlreadyExists(RequestId),
    #[error("index not found: {1} ({0})")]
    IndexNotFound(Status, DataRequestIndex),
    #[error("invalid status transition: {0}")]
    InvalidTransition(#[from] oracle_primitives::Error),
    #[error("unexpected data request count for status {0}")]
    UnexpectedCount(Status),
    #[error("timeout entry not found: ({0}, {1})")]
    TimeoutNotFound(u64, RequestId),
}
