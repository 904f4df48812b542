//! Governance-controlled parameters.

use crate::Error;
use num_rational::Ratio;

/// Lowest gas price a request may offer.
pub const MIN_GAS_PRICE: u128 = 2_000;

/// Lowest execution gas limit a request may set.
pub const MIN_EXEC_GAS_LIMIT: u64 = 10_000_000_000_000;

/// Lowest tally gas limit a request may set.
pub const MIN_TALLY_GAS_LIMIT: u64 = 10_000_000_000_000;

/// Largest replication factor a request may ask for, regardless of how many
/// stakers exist.
pub const MAX_REPLICATION_FACTOR: u16 = 100;

/// Phase timeouts and request payload limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolParams {
    /// Blocks a request stays in `Committing` before it expires.
    pub commit_timeout_in_blocks: u64,
    /// Blocks a request stays in `Revealing` before it expires.
    pub reveal_timeout_in_blocks: u64,
    /// Aggregate reveal payload limit, shared by the whole committee.
    pub dr_reveal_size_limit_in_bytes: usize,
    pub exec_input_limit_in_bytes: usize,
    pub tally_input_limit_in_bytes: usize,
    pub consensus_filter_limit_in_bytes: usize,
    pub memo_limit_in_bytes: usize,
    pub payback_address_limit_in_bytes: usize,
    pub seda_payload_limit_in_bytes: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            commit_timeout_in_blocks: 50,
            reveal_timeout_in_blocks: 5,
            dr_reveal_size_limit_in_bytes: 24_000,
            exec_input_limit_in_bytes: 2_048,
            tally_input_limit_in_bytes: 512,
            consensus_filter_limit_in_bytes: 512,
            memo_limit_in_bytes: 512,
            payback_address_limit_in_bytes: 128,
            seda_payload_limit_in_bytes: 512,
        }
    }
}

/// Gas costs and limits applied while tallying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TallyParams {
    /// Upper bound on the tally gas any request can use.
    pub max_tally_gas_limit: u64,
    /// Tally gas charged to every request as soon as tallying starts.
    pub base_gas_cost: u64,
    /// Gas credited per committer when no execution can be trusted.
    pub execution_gas_cost_fallback: u64,
    pub filter_gas_cost_none: u64,
    pub filter_gas_cost_multiplier_mode: u64,
    pub filter_gas_cost_multiplier_mad: u64,
    /// Longest result a tally program may return.
    pub max_result_size: usize,
    /// Requests finalized per block at most.
    pub max_tallies_per_block: usize,
    /// Share of executor rewards burned under a reduced payout.
    pub burn_ratio: Ratio<u64>,
}

impl Default for TallyParams {
    fn default() -> Self {
        Self {
            max_tally_gas_limit: 50_000_000_000_000,
            base_gas_cost: 1_000_000_000_000,
            execution_gas_cost_fallback: 5_000_000_000_000,
            filter_gas_cost_none: 100_000_000_000,
            filter_gas_cost_multiplier_mode: 100_000_000_000,
            filter_gas_cost_multiplier_mad: 100_000_000_000,
            max_result_size: 1_024,
            max_tallies_per_block: 100,
            burn_ratio: Ratio::new(1, 5),
        }
    }
}

/// Executor eligibility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakingParams {
    pub minimum_stake: u128,
    /// Only allowlisted identities may commit.
    pub allowlist_enabled: bool,
}

impl Default for StakingParams {
    fn default() -> Self {
        Self {
            minimum_stake: 1,
            allowlist_enabled: false,
        }
    }
}

/// Every parameter, updated as a unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params {
    pub protocol: ProtocolParams,
    pub tally: TallyParams,
    pub staking: StakingParams,
}

fn positive(name: &str, value: u64) -> Result<(), Error> {
    if value == 0 {
        return Err(Error::InvalidParams(format!("{name} must be positive")));
    }
    Ok(())
}

impl Params {
    /// Check every parameter, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), Error> {
        let protocol = &self.protocol;
        positive("commit_timeout_in_blocks", protocol.commit_timeout_in_blocks)?;
        positive("reveal_timeout_in_blocks", protocol.reveal_timeout_in_blocks)?;
        for (name, limit) in [
            ("dr_reveal_size_limit_in_bytes", protocol.dr_reveal_size_limit_in_bytes),
            ("exec_input_limit_in_bytes", protocol.exec_input_limit_in_bytes),
            ("tally_input_limit_in_bytes", protocol.tally_input_limit_in_bytes),
            ("consensus_filter_limit_in_bytes", protocol.consensus_filter_limit_in_bytes),
            ("memo_limit_in_bytes", protocol.memo_limit_in_bytes),
            ("payback_address_limit_in_bytes", protocol.payback_address_limit_in_bytes),
            ("seda_payload_limit_in_bytes", protocol.seda_payload_limit_in_bytes),
        ] {
            positive(name, limit as u64)?;
        }

        let tally = &self.tally;
        positive("max_tally_gas_limit", tally.max_tally_gas_limit)?;
        positive("base_gas_cost", tally.base_gas_cost)?;
        positive("execution_gas_cost_fallback", tally.execution_gas_cost_fallback)?;
        positive("filter_gas_cost_none", tally.filter_gas_cost_none)?;
        positive("filter_gas_cost_multiplier_mode", tally.filter_gas_cost_multiplier_mode)?;
        positive("filter_gas_cost_multiplier_mad", tally.filter_gas_cost_multiplier_mad)?;
        positive("max_result_size", tally.max_result_size as u64)?;
        positive("max_tallies_per_block", tally.max_tallies_per_block as u64)?;
        if tally.burn_ratio > Ratio::from_integer(1) {
            return Err(Error::InvalidParams(format!(
                "burn_ratio must be at most 1, got {}",
                tally.burn_ratio
            )));
        }

        if self.staking.minimum_stake == 0 {
            return Err(Error::InvalidParams("minimum_stake must be positive".into()));
        }
        Ok(())
    }
}
