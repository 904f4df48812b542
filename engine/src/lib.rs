//! Drive oracle data requests from posting to a finalized result.
//!
//! A data request is posted with escrowed funds and starts in `Committing`.
//! Staked executors each submit a blind commitment to their result; once the
//! replication factor is reached the request moves to `Revealing`, where every
//! committer discloses the result matching its commitment. Once enough reveals
//! arrive (or a phase times out) the request is tallied at the next block
//! boundary by [Engine::end_block]:
//!
//! 1. Timed out requests are forced into `Tallying`.
//! 2. Reveals are filtered with the request's consensus filter (see
//!    [oracle_filter]).
//! 3. Tally programs of requests that reached consensus without errors are
//!    executed, in parallel, on the [TallyVm].
//! 4. Gas is metered (see [oracle_gas]) and the escrow is split among burns,
//!    data proxies, executors, and the poster.
//! 5. A sealed [DataResult] is handed to the [ResultSink], the request is
//!    removed from the store, and only then does the escrow move.
//!
//! Everything outside this lifecycle (token movements, stake bookkeeping,
//! program storage, proof verification, and program execution) is reached
//! through the traits defined in this crate.
//!
//! # Status
//!
//! `oracle-engine` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use oracle_primitives::{DataResult, Identity, ProgramId, RequestId};
use std::collections::BTreeMap;
use thiserror::Error;

mod admin;
mod commit;
pub use commit::CommitSubmission;
mod config;
pub use config::{Config, State};
mod engine;
pub use engine::Engine;
mod metrics;
pub use metrics::Metrics;
pub mod mocks;
pub mod params;
pub use params::Params;
mod post;
pub use post::{PostRequest, Posted};
mod queries;
mod reveal;
pub use reveal::RevealSubmission;
pub mod tally;
pub mod verify;
pub use verify::{Domain, Ed25519Verifier};

/// Errors returned by the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("module is paused")]
    Paused,
    #[error("module is not paused")]
    NotPaused,
    #[error("sender is not the owner")]
    Unauthorized,
    #[error("no ownership transfer is pending for sender")]
    NotPendingOwner,
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("sender must not be empty")]
    EmptySender,
    #[error("replication factor must be positive")]
    ZeroReplicationFactor,
    #[error("replication factor too high: {0} > {1}")]
    ReplicationFactorTooHigh(u16, u16),
    #[error("gas price too low: {0} < {1}")]
    GasPriceTooLow(u128, u128),
    #[error("exec gas limit too low: {0} < {1}")]
    ExecGasLimitTooLow(u64, u64),
    #[error("tally gas limit too low: {0} < {1}")]
    TallyGasLimitTooLow(u64, u64),
    #[error("invalid program id: {0}")]
    InvalidProgramId(String),
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("{field} too large: {actual} bytes > {limit} bytes")]
    FieldTooLarge {
        field: &'static str,
        actual: usize,
        limit: usize,
    },
    #[error("invalid denom: {0}")]
    InvalidDenom(String),
    #[error("insufficient funds: required {required}, got {actual}")]
    InsufficientFunds { required: u128, actual: u128 },

    #[error("data request is not in committing status")]
    NotCommitting,
    #[error("data request is not in revealing status")]
    NotRevealing,
    #[error("commit phase expired at height {0}")]
    CommitTimeout(u64),
    #[error("reveal phase expired at height {0}")]
    RevealTimeout(u64),
    #[error("data request has no timeout height: {0}")]
    MissingTimeout(RequestId),
    #[error("already committed: {0}")]
    AlreadyCommitted(Identity),
    #[error("already revealed: {0}")]
    AlreadyRevealed(Identity),
    #[error("not committed: {0}")]
    NotCommitted(Identity),
    #[error("not a staker: {0}")]
    NotStaker(Identity),
    #[error("insufficient stake: {0} < {1}")]
    InsufficientStake(u128, u128),
    #[error("not allowlisted: {0}")]
    NotAllowlisted(Identity),
    #[error("already allowlisted: {0}")]
    AlreadyAllowlisted(Identity),
    #[error("not in allowlist: {0}")]
    NotInAllowlist(Identity),

    #[error("reveal does not belong to data request {0} at its posting height")]
    RevealBodyMismatch(RequestId),
    #[error("reveal too big: {0} bytes > {1} bytes")]
    RevealTooBig(usize, usize),
    #[error("invalid data proxy public key: {0}")]
    InvalidProxyPublicKey(String),
    #[error("revealed result does not match the committed result")]
    RevealMismatch,
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("store error: {0}")]
    Store(#[from] oracle_store::Error),
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("staking error: {0}")]
    Staking(String),
    #[error("result sink error: {0}")]
    ResultSink(String),
    #[error("unable to build thread pool: {0}")]
    ThreadPool(String),
    #[error("halting data request flow: {0}")]
    Halted(String),
}

/// Verifies that `proof` was produced by `identity` over a message hash.
pub trait ProofVerifier {
    type Error: std::error::Error;

    fn verify(&self, identity: &Identity, message: &[u8], proof: &[u8]) -> Result<(), Self::Error>;
}

/// Output of a tally program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VmResult {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub result: Vec<u8>,
    pub exit_code: u8,
    pub exit_message: String,
    pub gas_used: u64,
}

/// Sandboxed executor of tally programs.
///
/// Executions must be pure functions of their inputs: the engine runs them
/// concurrently and in no particular order.
pub trait TallyVm: Sync {
    fn execute(
        &self,
        program: &[u8],
        args: &[String],
        env: &BTreeMap<String, String>,
        gas_limit: u64,
    ) -> VmResult;
}

/// Token movements of the module account.
pub trait Ledger {
    /// Denomination in which requests are paid.
    fn bond_denom(&self) -> String;

    /// Move `amount` from `from` into the module account.
    fn escrow(&mut self, from: &str, amount: u128) -> Result<(), Error>;

    /// Move `amount` from the module account to `to`.
    fn send(&mut self, to: &str, amount: u128) -> Result<(), Error>;

    /// Destroy `amount` held by the module account.
    fn burn(&mut self, amount: u128) -> Result<(), Error>;

    /// Refund the transaction fee paid by `identity` for a commit or reveal.
    fn refund_fee(&mut self, identity: &Identity, request: &RequestId);
}

/// Stake held by an executor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Staker {
    pub staked: u128,
    pub pending_withdrawal: u128,
}

/// Executor stake and allowlist bookkeeping.
pub trait Staking {
    fn staker(&self, identity: &Identity) -> Option<Staker>;

    fn set_staker(&mut self, identity: &Identity, staker: Staker) -> Result<(), Error>;

    fn staker_count(&self) -> u32;

    fn is_allowlisted(&self, identity: &Identity) -> bool;

    fn set_allowlisted(&mut self, identity: &Identity, allowlisted: bool);
}

/// Registration of a data proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub payout_address: String,
    /// Fee charged per execution, in the bond denomination.
    pub fee: u128,
}

/// Registry of data proxies, keyed by raw public key.
pub trait DataProxies {
    fn proxy_config(&self, public_key: &[u8]) -> Option<ProxyConfig>;
}

/// Oracle program storage.
pub trait Programs {
    fn program(&self, id: &ProgramId) -> Option<Vec<u8>>;
}

/// Destination of finalized results.
pub trait ResultSink {
    fn emit(&mut self, result: &DataResult) -> Result<(), Error>;
}

/// Everything the engine needs from the chain it runs on.
pub trait Host: Ledger + Staking + DataProxies + Programs + ResultSink {}

impl<T: Ledger + Staking + DataProxies + Programs + ResultSink> Host for T {}

/// An amount of tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}
