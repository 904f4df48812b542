//! Decide whether a committee agreed on a result and which reveals are outliers.
//!
//! Filtering happens in two stages. First, reveals must reach basic consensus:
//! at least two thirds of the replication factor must agree on whether
//! execution succeeded and on the (sorted) set of data proxies consulted.
//! Second, a data-level [Filter] selected by the first byte of the request's
//! filter input inspects the revealed payloads:
//!
//! - `0x00` [Filter::None] accepts every reveal.
//! - `0x01` [Filter::Mode] extracts a value at a JSON path and marks every
//!   reveal that does not hold the most frequent value as an outlier.
//! - `0x02` [Filter::Mad] extracts an integer at a JSON path and marks every
//!   reveal that deviates from the median by more than a multiple of the
//!   median absolute deviation as an outlier.
//!
//! Building a filter consumes tally gas from the request's
//! [oracle_gas::GasMeter]. When at least two thirds of the replication factor
//! errored, the errors themselves are the agreed outcome
//! ([Error::ConsensusInError]).
//!
//! # Status
//!
//! `oracle-filter` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use oracle_primitives::Identity;
use thiserror::Error;

mod consensus;
pub use consensus::execute;
mod extract;
mod filter;
pub use filter::Filter;
mod mad;
pub use mad::NumberType;
mod mode;
mod sigma;
pub use sigma::SigmaMultiplier;

/// Filter type discriminators.
pub const FILTER_TYPE_NONE: u8 = 0x00;
pub const FILTER_TYPE_MODE: u8 = 0x01;
pub const FILTER_TYPE_MAD: u8 = 0x02;

/// Outcome kinds and filter construction errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("no basic consensus among reveals")]
    NoBasicConsensus,
    #[error("more than 1/3 of reveals do not agree on reveal data")]
    NoConsensus,
    #[error("more than 2/3 of reveals are corrupted")]
    ConsensusInError,
    #[error("invalid filter input: {0}")]
    InvalidFilterInput(Box<Error>),
    #[error("invalid filter type")]
    InvalidFilterType,
    #[error("filter input too short: {0} < {1}")]
    FilterInputTooShort(usize, usize),
    #[error("invalid JSON path length: expected {expected}, got {actual}")]
    InvalidPathLen { expected: u64, actual: usize },
    #[error("invalid number type: {0}")]
    InvalidNumberType(u8),
    #[error("invalid sigma multiplier: expected 8 bytes, got {0}")]
    InvalidSigmaMultiplier(usize),
    #[error("invalid JSON path: {0}")]
    InvalidJsonPath(String),
    #[error("out of tally gas")]
    OutOfTallyGas,
    #[error("filter did not run")]
    FilterDidNotRun,
}

/// Tally gas charged for building each filter type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterCosts {
    /// Flat cost of [Filter::None].
    pub none: u64,
    /// Cost of [Filter::Mode] per unit of replication factor.
    pub mode_multiplier: u64,
    /// Cost of [Filter::Mad] per unit of replication factor.
    pub mad_multiplier: u64,
}

/// Result of filtering the reveals of one request.
///
/// Every vector is indexed by the position of the reveal in the (sorted)
/// input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterResult {
    pub executors: Vec<Identity>,
    /// Reveals that exited with a non-zero code or whose payload was corrupt.
    pub errors: Vec<bool>,
    /// `None` when no outlier determination was made.
    pub outliers: Option<Vec<bool>>,
    /// Whether consensus was reached, either in data or in error.
    pub consensus: bool,
    /// Data proxies the majority of reveals agreed on.
    pub proxy_pub_keys: Vec<String>,
    pub error: Option<Error>,
}

impl FilterResult {
    /// Result for a request that was finalized without filtering.
    pub fn did_not_run() -> Self {
        Self {
            executors: Vec::new(),
            errors: Vec::new(),
            outliers: None,
            consensus: false,
            proxy_pub_keys: Vec::new(),
            error: Some(Error::FilterDidNotRun),
        }
    }
}
