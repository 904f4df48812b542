//! Posting of new data requests.

use crate::{
    engine::{REQUESTS, TIMEOUTS},
    params::{
        ProtocolParams, MAX_REPLICATION_FACTOR, MIN_EXEC_GAS_LIMIT, MIN_GAS_PRICE,
        MIN_TALLY_GAS_LIMIT,
    },
    Coin, Engine, Error, Host, ProofVerifier, TallyVm,
};
use oracle_primitives::{DataRequest, ProgramId, RequestBody, RequestId, Status};
use oracle_store::kv::{transact, Kv};
use std::str::FromStr;
use tracing::{debug, warn};

/// A request to run a program on the oracle network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostRequest {
    /// Strict `MAJOR.MINOR.PATCH` version.
    pub version: String,
    /// Hex-encoded id of the program executed by the committee.
    pub exec_program_id: String,
    pub exec_inputs: Vec<u8>,
    pub exec_gas_limit: u64,
    /// Hex-encoded id of the program executed over the reveals.
    pub tally_program_id: String,
    pub tally_inputs: Vec<u8>,
    pub tally_gas_limit: u64,
    pub replication_factor: u16,
    pub consensus_filter: Vec<u8>,
    /// Minimum price per unit of gas the poster is willing to pay.
    pub gas_price: u128,
    pub memo: Vec<u8>,
    pub payback_address: Vec<u8>,
    pub seda_payload: Vec<u8>,
}

/// Outcome of a successful post.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Posted {
    pub request_id: RequestId,
    pub height: u64,
}

/// Returns true if `version` is `MAJOR.MINOR.PATCH` with no leading zeros,
/// pre-release, or build metadata.
fn is_strict_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.bytes().all(|b| b.is_ascii_digit())
                && (part.len() == 1 || !part.starts_with('0'))
                && part.parse::<u64>().is_ok()
        })
}

fn program_id(raw: &str) -> Result<ProgramId, Error> {
    ProgramId::from_str(raw).map_err(|_| Error::InvalidProgramId(raw.to_string()))
}

fn check_size(field: &'static str, value: &[u8], limit: usize) -> Result<(), Error> {
    if value.len() > limit {
        return Err(Error::FieldTooLarge {
            field,
            actual: value.len(),
            limit,
        });
    }
    Ok(())
}

impl PostRequest {
    /// Check every field that does not depend on chain state and build the
    /// request body.
    pub fn validate(self, limits: &ProtocolParams) -> Result<RequestBody, Error> {
        if self.replication_factor == 0 {
            return Err(Error::ZeroReplicationFactor);
        }
        if self.gas_price < MIN_GAS_PRICE {
            return Err(Error::GasPriceTooLow(self.gas_price, MIN_GAS_PRICE));
        }
        if self.exec_gas_limit < MIN_EXEC_GAS_LIMIT {
            return Err(Error::ExecGasLimitTooLow(
                self.exec_gas_limit,
                MIN_EXEC_GAS_LIMIT,
            ));
        }
        if self.tally_gas_limit < MIN_TALLY_GAS_LIMIT {
            return Err(Error::TallyGasLimitTooLow(
                self.tally_gas_limit,
                MIN_TALLY_GAS_LIMIT,
            ));
        }
        let exec_program_id = program_id(&self.exec_program_id)?;
        let tally_program_id = program_id(&self.tally_program_id)?;
        if !is_strict_semver(&self.version) {
            return Err(Error::InvalidVersion(self.version));
        }

        check_size("exec_inputs", &self.exec_inputs, limits.exec_input_limit_in_bytes)?;
        check_size("tally_inputs", &self.tally_inputs, limits.tally_input_limit_in_bytes)?;
        check_size(
            "consensus_filter",
            &self.consensus_filter,
            limits.consensus_filter_limit_in_bytes,
        )?;
        check_size("memo", &self.memo, limits.memo_limit_in_bytes)?;
        check_size(
            "payback_address",
            &self.payback_address,
            limits.payback_address_limit_in_bytes,
        )?;
        check_size("seda_payload", &self.seda_payload, limits.seda_payload_limit_in_bytes)?;

        Ok(RequestBody {
            version: self.version,
            exec_program_id,
            exec_inputs: self.exec_inputs,
            exec_gas_limit: self.exec_gas_limit,
            tally_program_id,
            tally_inputs: self.tally_inputs,
            tally_gas_limit: self.tally_gas_limit,
            replication_factor: self.replication_factor,
            consensus_filter: self.consensus_filter,
            gas_price: self.gas_price,
            memo: self.memo,
            payback_address: self.payback_address,
            seda_payload: self.seda_payload,
        })
    }
}

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    /// Post a request funded with `funds` taken from `sender`.
    pub fn post_request(
        &mut self,
        sender: &str,
        request: PostRequest,
        funds: &Coin,
        height: u64,
    ) -> Result<Posted, Error> {
        if self.state.paused {
            return Err(Error::Paused);
        }
        if sender.is_empty() {
            return Err(Error::EmptySender);
        }
        let body = request.validate(&self.params.protocol)?;

        let stakers = u16::try_from(self.host.staker_count()).unwrap_or(u16::MAX);
        let max_replication_factor = stakers.min(MAX_REPLICATION_FACTOR);
        if body.replication_factor > max_replication_factor {
            return Err(Error::ReplicationFactorTooHigh(
                body.replication_factor,
                max_replication_factor,
            ));
        }

        let denom = self.host.bond_denom();
        if funds.denom != denom {
            return Err(Error::InvalidDenom(funds.denom.clone()));
        }
        let total_gas = body.exec_gas_limit as u128 + body.tally_gas_limit as u128;
        let posted_gas_price = funds.amount / total_gas;
        if posted_gas_price < body.gas_price {
            return Err(Error::InsufficientFunds {
                required: body.gas_price.saturating_mul(total_gas),
                actual: funds.amount,
            });
        }

        let id = body.id();
        if REQUESTS.has(&self.db, &id)? {
            return Err(oracle_store::Error::AlreadyExists(id).into());
        }
        let timeout_height = height.saturating_add(self.params.protocol.commit_timeout_in_blocks);
        let request = DataRequest {
            id,
            body,
            poster: sender.to_string(),
            posted_gas_price,
            height,
            timeout_height: Some(timeout_height),
            status: Status::Committing,
            escrow: funds.amount,
            commits: Default::default(),
            reveals: Default::default(),
        };

        self.host.escrow(sender, funds.amount)?;
        let stored = transact(&mut self.db, |batch| {
            REQUESTS.store(batch, &request)?;
            TIMEOUTS.add(batch, &id, timeout_height);
            Ok::<_, Error>(())
        });
        if let Err(err) = stored {
            // Undo the escrow
            if let Err(refund) = self.host.send(sender, funds.amount) {
                warn!(?refund, %id, "unable to return escrow of failed post");
            }
            return Err(err);
        }

        self.metrics.requests_posted.inc();
        debug!(%id, height, posted_gas_price, timeout_height, "posted data request");
        Ok(Posted {
            request_id: id,
            height,
        })
    }
}
