//! Finalize data requests at the end of every block.
//!
//! [Engine::end_block] first expires every request whose commit or reveal
//! phase timed out, then finalizes up to `max_tallies_per_block` requests in
//! `Tallying`, highest posted gas price first and earliest posted among
//! equal prices. Finalizing a request:
//!
//! 1. Filters its reveals (sorted with entropy from the request id and the
//!    block height) with the request's consensus filter.
//! 2. Queues its tally program if the committee reached consensus. All queued
//!    programs of the block run as one batch, in parallel if the engine is
//!    configured with more than one thread.
//! 3. Meters the gas owed to data proxies and committee members and splits
//!    the escrow into payouts (see [Settlement]). Nothing moves yet.
//! 4. Hands a sealed [DataResult] to the [crate::ResultSink].
//! 5. Removes the request and stages its payouts in one write, then applies
//!    the payouts.
//!
//! Requests that cannot be filtered still produce a result: the exit code
//! tells why (see the `EXIT_CODE_*` constants) and the result holds the reason
//! as text.
//!
//! If the store, the ledger, or the result sink fails, processing of the block
//! stops with [Error::Halted] and the `flow_halted` gauge is set until a block
//! is processed cleanly. A request whose result was not emitted is tallied
//! again by the next block. Payouts left unapplied by a ledger failure stay
//! staged and are applied first by the next block, so escrow is never paid
//! twice.

mod expire;
mod settle;
pub(crate) use settle::Payouts;
pub use settle::Settlement;
mod vm;

use crate::{
    engine::{PAYOUTS, REQUESTS},
    DataProxies, Engine, Error, Host, ProofVerifier, TallyVm, VmResult,
};
use commonware_utils::from_hex;
use oracle_filter::{Error as FilterError, FilterCosts, FilterResult};
use oracle_gas::{
    entropy,
    executor::{meter_executors, meter_fallback, proxy_gas_per_exec},
    GasMeter,
};
use oracle_primitives::{hash_sort, DataRequest, DataResult, Identity, RequestId, Reveal, Status};
use oracle_store::kv::{transact, Direction, Kv};
use std::{collections::BTreeSet, ops::Bound};
use tracing::{debug, error, info, warn};

/// Fewer members committed than the replication factor.
pub const EXIT_CODE_NOT_ENOUGH_COMMITS: u8 = 200;
/// The module was paused when the request was finalized.
pub const EXIT_CODE_CONTRACT_PAUSED: u8 = 201;
/// The stored request cannot be processed.
pub const EXIT_CODE_INVALID_REQUEST: u8 = 252;
/// The reveals did not pass the consensus filter.
pub const EXIT_CODE_FILTER_ERROR: u8 = 253;
/// The consensus filter of the request is malformed.
pub const EXIT_CODE_INVALID_FILTER_INPUT: u8 = 254;
/// The tally program could not be executed or returned an invalid result.
pub const EXIT_CODE_EXEC_ERROR: u8 = 255;

/// A request finalized by [Engine::end_block].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tallied {
    pub result: DataResult,
    pub settlement: Settlement,
}

enum Outcome {
    /// Finalized without charging any gas.
    Refund,
    NotEnoughCommits {
        meter: GasMeter,
    },
    Filtered {
        meter: GasMeter,
        filter: FilterResult,
        /// Gas reported by each revealer, in filter order.
        reports: Vec<u64>,
        /// The tally program could not be run or its result was rejected.
        exec_failed: bool,
    },
}

struct Tally {
    request: DataRequest,
    outcome: Outcome,
    consensus: bool,
    exit_code: u8,
    result: Vec<u8>,
    job: Option<vm::Job>,
}

impl Tally {
    fn refund(request: DataRequest, exit_code: u8, reason: &str) -> Self {
        debug!(id = %request.id, exit_code, reason, "refunding data request");
        Self {
            request,
            outcome: Outcome::Refund,
            consensus: false,
            exit_code,
            result: reason.as_bytes().to_vec(),
            job: None,
        }
    }

    fn fail_execution(&mut self, reason: String) {
        if let Outcome::Filtered { exec_failed, .. } = &mut self.outcome {
            *exec_failed = true;
        }
        self.exit_code = EXIT_CODE_EXEC_ERROR;
        self.result = reason.into_bytes();
    }

    /// Fold the output of the tally program into the tally.
    fn record_execution(&mut self, output: VmResult, max_result_size: usize) {
        let Outcome::Filtered { meter, .. } = &mut self.outcome else {
            return;
        };
        meter.consume_tally_gas(output.gas_used);
        debug!(
            id = %self.request.id,
            exit_code = output.exit_code,
            gas_used = output.gas_used,
            stdout = ?output.stdout,
            stderr = ?output.stderr,
            "executed tally program"
        );
        if output.result.len() > max_result_size {
            self.fail_execution(format!(
                "tally result too large: {} bytes > {max_result_size} bytes",
                output.result.len()
            ));
            return;
        }
        self.exit_code = output.exit_code;
        self.result = if output.result.is_empty() && output.exit_code != 0 {
            output.exit_message.into_bytes()
        } else {
            output.result
        };
    }
}

/// Credit every agreed data proxy its fee for each execution.
///
/// Keys that cannot be decoded or have no registration are skipped.
fn meter_proxies<P: DataProxies>(
    proxies: &P,
    keys: &[String],
    replication_factor: u16,
    meter: &mut GasMeter,
) {
    for key in keys {
        let Some(raw) = from_hex(key) else {
            warn!(key, "skipping undecodable data proxy key");
            continue;
        };
        let Some(config) = proxies.proxy_config(&raw) else {
            warn!(key, "skipping unregistered data proxy");
            continue;
        };
        let gas_per_exec = proxy_gas_per_exec(meter, config.fee, replication_factor);
        meter.consume_exec_gas_for_proxy(
            key.clone(),
            config.payout_address,
            gas_per_exec,
            replication_factor,
        );
    }
}

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    /// Expire timed out requests and finalize requests in `Tallying`.
    ///
    /// Returns the requests finalized in this block, in processing order.
    pub fn end_block(&mut self, height: u64, timestamp: u64) -> Result<Vec<Tallied>, Error> {
        match self.process_block(height, timestamp) {
            Ok(tallied) => {
                self.metrics.flow_halted.set(0);
                Ok(tallied)
            }
            Err(err) => {
                error!(?err, height, "halting data request flow");
                self.metrics.flow_halted.set(1);
                Err(Error::Halted(err.to_string()))
            }
        }
    }

    fn process_block(&mut self, height: u64, timestamp: u64) -> Result<Vec<Tallied>, Error> {
        let staged = PAYOUTS.scan(
            &self.db,
            Bound::Unbounded,
            Bound::Unbounded,
            Direction::Forward,
            usize::MAX,
        )?;
        for (id, payouts) in staged {
            warn!(%id, payouts = payouts.0.len(), "resuming staged payouts");
            self.pay_out(&id, payouts)?;
        }

        let expired = self.expire(height)?;

        let limit = self.params.tally.max_tallies_per_block;
        let indices = REQUESTS.indices_by_status(&self.db, Status::Tallying)?;
        let mut tallies = Vec::with_capacity(indices.len().min(limit));
        for index in indices.iter().take(limit) {
            let request = REQUESTS.get(&self.db, &index.id())?;
            tallies.push(self.prepare(request, height)?);
        }

        self.execute(&mut tallies);

        let mut tallied = Vec::with_capacity(tallies.len());
        for tally in tallies {
            tallied.push(self.finalize(tally, height, timestamp)?);
            self.metrics.requests_tallied.inc();
        }
        info!(height, expired, tallied = tallied.len(), "processed data requests");
        Ok(tallied)
    }

    /// Reveals of `request`, each with sorted proxy keys, in tally order.
    fn sorted_reveals(&self, request: &DataRequest, height: u64) -> Result<Vec<Reveal>, Error> {
        let reveals = REQUESTS
            .reveal_bodies(&self.db, &request.id)?
            .into_iter()
            .filter(|(identity, _)| request.reveals.contains(identity))
            .map(|(executor, mut body)| {
                body.proxy_pub_keys.sort();
                Reveal { executor, body }
            })
            .collect();
        let entropy = entropy(&request.id, height);
        Ok(hash_sort(reveals, Some(&entropy)))
    }

    /// Filter the reveals of `request` and queue its tally program if the
    /// committee reached consensus.
    fn prepare(&self, request: DataRequest, height: u64) -> Result<Tally, Error> {
        if self.state.paused {
            return Ok(Tally::refund(
                request,
                EXIT_CODE_CONTRACT_PAUSED,
                "contract is paused",
            ));
        }
        if request.posted_gas_price == 0 {
            return Ok(Tally::refund(
                request,
                EXIT_CODE_INVALID_REQUEST,
                "unable to process request. error: invalid gas price: 0",
            ));
        }

        let params = &self.params.tally;
        let mut meter = GasMeter::new(
            request.body.tally_gas_limit,
            params.max_tally_gas_limit,
            request.body.exec_gas_limit,
            request.posted_gas_price,
            params.base_gas_cost,
        );
        let replication_factor = request.replication_factor();
        let commits = request.commits.len();
        if commits < replication_factor as usize {
            debug!(id = %request.id, commits, replication_factor, "not enough commits");
            return Ok(Tally {
                request,
                outcome: Outcome::NotEnoughCommits { meter },
                consensus: false,
                exit_code: EXIT_CODE_NOT_ENOUGH_COMMITS,
                result: format!("need {replication_factor} commits; received {commits}")
                    .into_bytes(),
                job: None,
            });
        }

        let reveals = self.sorted_reveals(&request, height)?;
        let costs = FilterCosts {
            none: params.filter_gas_cost_none,
            mode_multiplier: params.filter_gas_cost_multiplier_mode,
            mad_multiplier: params.filter_gas_cost_multiplier_mad,
        };
        let filter = oracle_filter::execute(
            &reveals,
            &request.body.consensus_filter,
            replication_factor,
            &costs,
            &mut meter,
        );
        debug!(
            id = %request.id,
            reveals = reveals.len(),
            consensus = filter.consensus,
            error = ?filter.error,
            "filtered reveals"
        );

        let consensus = filter.consensus;
        let (exit_code, result) = match &filter.error {
            Some(err @ FilterError::InvalidFilterInput(_)) => {
                (EXIT_CODE_INVALID_FILTER_INPUT, err.to_string().into_bytes())
            }
            Some(err @ FilterError::ConsensusInError) => {
                (EXIT_CODE_FILTER_ERROR, err.to_string().into_bytes())
            }
            Some(err) if !consensus => (EXIT_CODE_FILTER_ERROR, err.to_string().into_bytes()),
            _ => (0, Vec::new()),
        };
        let outliers = filter.outliers.clone().unwrap_or_default();
        let gas_limit = meter.tally_gas_remaining();
        let mut tally = Tally {
            outcome: Outcome::Filtered {
                meter,
                filter,
                reports: reveals.iter().map(|reveal| reveal.body.gas_used).collect(),
                exec_failed: false,
            },
            consensus,
            exit_code,
            result,
            job: None,
            request,
        };
        // The committee agreed that execution failed: nothing to tally
        if !consensus || exit_code != 0 {
            return Ok(tally);
        }

        let program_id = tally.request.body.tally_program_id;
        let Some(program) = self.host.program(&program_id) else {
            tally.fail_execution(format!("tally program not found: {program_id}"));
            return Ok(tally);
        };
        match vm::Job::new(
            &tally.request,
            program,
            &reveals,
            &outliers,
            consensus,
            gas_limit,
            height,
        ) {
            Ok(job) => tally.job = Some(job),
            Err(err) => {
                tally.fail_execution(format!("unable to build tally program arguments: {err}"))
            }
        }
        Ok(tally)
    }

    /// Run every queued tally program and fold the outputs back in order.
    fn execute(&self, tallies: &mut [Tally]) {
        let (positions, jobs): (Vec<usize>, Vec<vm::Job>) = tallies
            .iter_mut()
            .enumerate()
            .filter_map(|(position, tally)| tally.job.take().map(|job| (position, job)))
            .unzip();
        if jobs.is_empty() {
            return;
        }
        let outputs = vm::run(&self.vm, self.pool.as_ref(), &jobs);
        let max_result_size = self.params.tally.max_result_size;
        for (position, output) in positions.into_iter().zip(outputs) {
            tallies[position].record_execution(output, max_result_size);
        }
    }

    /// Meter gas, emit the result, then remove the request and pay out its
    /// escrow.
    fn finalize(&mut self, tally: Tally, height: u64, timestamp: u64) -> Result<Tallied, Error> {
        let Tally {
            request,
            outcome,
            consensus,
            exit_code,
            result,
            ..
        } = tally;
        let replication_factor = request.replication_factor();
        let fallback_cost = self.params.tally.execution_gas_cost_fallback;
        let meter = match outcome {
            Outcome::Refund => None,
            Outcome::NotEnoughCommits { mut meter } => {
                let committers: BTreeSet<Identity> = request.commits.keys().cloned().collect();
                meter_fallback(
                    &mut meter,
                    &committers,
                    &request.reveals,
                    replication_factor,
                    fallback_cost,
                );
                Some(meter)
            }
            Outcome::Filtered {
                mut meter,
                filter,
                reports,
                exec_failed,
            } => {
                match filter.error {
                    Some(FilterError::NoBasicConsensus) => {
                        let committers: BTreeSet<Identity> =
                            request.commits.keys().cloned().collect();
                        meter_fallback(
                            &mut meter,
                            &committers,
                            &request.reveals,
                            replication_factor,
                            fallback_cost,
                        );
                    }
                    ref error => {
                        meter_proxies(
                            &self.host,
                            &filter.proxy_pub_keys,
                            replication_factor,
                            &mut meter,
                        );
                        if exec_failed
                            || matches!(
                                error,
                                Some(FilterError::InvalidFilterInput(_))
                                    | Some(FilterError::NoConsensus)
                            )
                        {
                            meter.set_reduced_payout();
                        }
                        meter_executors(
                            &mut meter,
                            &filter.executors,
                            &reports,
                            filter.outliers.as_deref(),
                            replication_factor,
                        );
                    }
                }
                Some(meter)
            }
        };

        let (distributions, gas_used) = match &meter {
            Some(meter) => (
                meter.read(&request.id, height, self.params.tally.burn_ratio),
                meter.total_gas_used(),
            ),
            None => (Vec::new(), 0),
        };
        let (settlement, payouts) = settle::plan(&self.host, &request, &distributions)?;

        let result = DataResult {
            dr_id: request.id,
            dr_block_height: request.height,
            version: request.body.version.clone(),
            block_height: height,
            block_timestamp: timestamp,
            consensus,
            exit_code,
            gas_used,
            result,
            payback_address: request.body.payback_address.clone(),
            seda_payload: request.body.seda_payload.clone(),
            ..Default::default()
        }
        .seal();
        self.host.emit(&result)?;
        transact(&mut self.db, |batch| {
            REQUESTS.remove(batch, &request.index(), Status::Tallying)?;
            PAYOUTS.set(batch, &request.id, &payouts);
            Ok::<_, oracle_store::Error>(())
        })?;
        self.pay_out(&request.id, payouts)?;

        debug!(
            id = %request.id,
            result_id = %result.id,
            exit_code,
            consensus,
            gas_used,
            burned = settlement.burned,
            refunded = settlement.refunded,
            "finalized data request"
        );
        Ok(Tallied { result, settlement })
    }

    /// Apply the payouts staged for `id` in order.
    ///
    /// If one fails, the payouts not yet applied are staged again.
    fn pay_out(&mut self, id: &RequestId, mut payouts: Payouts) -> Result<(), Error> {
        let minimum_stake = self.params.staking.minimum_stake;
        let mut paid = 0;
        let mut failure = None;
        for payout in &payouts.0 {
            if let Err(err) = settle::pay(&mut self.host, payout, minimum_stake) {
                failure = Some(err);
                break;
            }
            paid += 1;
        }
        let left = Payouts(payouts.0.split_off(paid));
        transact(&mut self.db, |batch| {
            if left.0.is_empty() {
                PAYOUTS.remove(batch, id);
            } else {
                PAYOUTS.set(batch, id, &left);
            }
            Ok::<_, oracle_store::Error>(())
        })?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
