//! Identifiers, requests, reveals, and content hashes shared by the oracle engine.
//!
//! Every type persisted by the engine implements [commonware_codec::Write],
//! [commonware_codec::Read], and [commonware_codec::EncodeSize]. Keys that are
//! used for ordered iteration ([DataRequestIndex], [Status]) encode to
//! big-endian, fixed-width bytes so that byte order equals logical order.
//!
//! # Status
//!
//! `oracle-primitives` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

mod hash;
pub use hash::{hash, hash_sort, HashSortable, DIGEST_LENGTH};
mod id;
pub use id::{Commitment, Identity, ProgramId, RequestId};
mod index;
pub use index::DataRequestIndex;
mod request;
pub use request::{DataRequest, RequestBody};
mod result;
pub use result::DataResult;
mod reveal;
pub use reveal::{Reveal, RevealBody};
mod status;
pub use status::Status;
pub mod wire;

use thiserror::Error;

/// Errors that can occur when interpreting primitive values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid status: {0}")]
    InvalidStatus(u8),
    #[error("invalid transition: {0} -> {1}")]
    InvalidTransition(Status, Status),
}
