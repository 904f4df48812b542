//! Gas metering and payout distribution for tallied data requests.
//!
//! A [GasMeter] is created fresh for every request that reaches tallying. It
//! tracks two budgets:
//!
//! - tally gas, spent on-chain by the filter and the tally program and
//!   burned once the request is finalized;
//! - execution gas, paid out to the data proxies consulted by the committee
//!   and to the committee members themselves.
//!
//! The [executor] module holds the policies that decide how much execution gas
//! each committee member is credited. Once metering is complete, [GasMeter::read]
//! turns the meter into an ordered list of [Distribution]s that the caller
//! settles against the request's escrow.
//!
//! # Status
//!
//! `oracle-gas` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

mod distribution;
pub use distribution::Distribution;
pub mod executor;
mod meter;
pub use meter::{entropy, ExecutorGasUsed, GasMeter, ProxyGasUsed};
