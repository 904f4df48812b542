use crate::Distribution;
use num_rational::Ratio;
use oracle_primitives::{hash_sort, HashSortable, Identity, RequestId};
use tracing::debug;

/// Execution gas credited to a data proxy, across the whole committee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyGasUsed {
    /// Hex-encoded public key of the proxy.
    pub public_key: String,
    pub payout_address: String,
    pub amount: u64,
}

impl HashSortable for ProxyGasUsed {
    fn sort_key(&self) -> &[u8] {
        self.public_key.as_bytes()
    }
}

/// Execution gas credited to a committee member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorGasUsed {
    pub identity: Identity,
    pub amount: u64,
}

/// Per-request accumulator of tally and execution gas.
#[derive(Clone, Debug)]
pub struct GasMeter {
    tally_gas_limit: u64,
    tally_gas_remaining: u64,
    exec_gas_limit: u64,
    exec_gas_remaining: u64,
    /// Sum of the per-execution gas of every metered proxy.
    total_proxy_gas_per_exec: u64,
    gas_price: u128,
    proxies: Vec<ProxyGasUsed>,
    executors: Vec<ExecutorGasUsed>,
    reduced_payout: bool,
}

impl GasMeter {
    /// Create a meter and charge the base cost.
    ///
    /// The tally gas limit is capped at `max_tally_gas_limit`. The base cost
    /// is charged even if it exceeds the limit, in which case no tally gas is
    /// left.
    pub fn new(
        tally_gas_limit: u64,
        max_tally_gas_limit: u64,
        exec_gas_limit: u64,
        gas_price: u128,
        base_gas_cost: u64,
    ) -> Self {
        let tally_gas_limit = tally_gas_limit.min(max_tally_gas_limit);
        let mut meter = Self {
            tally_gas_limit,
            tally_gas_remaining: tally_gas_limit,
            exec_gas_limit,
            exec_gas_remaining: exec_gas_limit,
            total_proxy_gas_per_exec: 0,
            gas_price,
            proxies: Vec::new(),
            executors: Vec::new(),
            reduced_payout: false,
        };
        meter.consume_tally_gas(base_gas_cost);
        meter
    }

    pub fn tally_gas_limit(&self) -> u64 {
        self.tally_gas_limit
    }

    pub fn tally_gas_remaining(&self) -> u64 {
        self.tally_gas_remaining
    }

    pub fn tally_gas_used(&self) -> u64 {
        self.tally_gas_limit - self.tally_gas_remaining
    }

    pub fn exec_gas_remaining(&self) -> u64 {
        self.exec_gas_remaining
    }

    pub fn exec_gas_used(&self) -> u64 {
        self.exec_gas_limit - self.exec_gas_remaining
    }

    /// Tally and execution gas used.
    pub fn total_gas_used(&self) -> u128 {
        self.tally_gas_used() as u128 + self.exec_gas_used() as u128
    }

    /// Price paid per unit of gas.
    pub fn gas_price(&self) -> u128 {
        self.gas_price
    }

    pub fn proxies(&self) -> &[ProxyGasUsed] {
        &self.proxies
    }

    pub fn executors(&self) -> &[ExecutorGasUsed] {
        &self.executors
    }

    pub fn reduced_payout(&self) -> bool {
        self.reduced_payout
    }

    /// Burn a share of every executor payout when the meter is read.
    pub fn set_reduced_payout(&mut self) {
        self.reduced_payout = true;
    }

    /// Consume up to `amount` tally gas, returning true if the remaining tally
    /// gas did not cover it.
    pub fn consume_tally_gas(&mut self, amount: u64) -> bool {
        if amount > self.tally_gas_remaining {
            self.tally_gas_remaining = 0;
            return true;
        }
        self.tally_gas_remaining -= amount;
        false
    }

    /// Credit a data proxy with `gas_per_exec` for each of the
    /// `replication_factor` executions.
    pub fn consume_exec_gas_for_proxy(
        &mut self,
        public_key: String,
        payout_address: String,
        gas_per_exec: u64,
        replication_factor: u16,
    ) {
        let amount = gas_per_exec.saturating_mul(replication_factor as u64);
        self.exec_gas_remaining = self.exec_gas_remaining.saturating_sub(amount);
        self.total_proxy_gas_per_exec = self.total_proxy_gas_per_exec.saturating_add(gas_per_exec);
        debug!(%public_key, amount, "metered proxy gas");
        self.proxies.push(ProxyGasUsed {
            public_key,
            payout_address,
            amount,
        });
    }

    /// Credit a committee member with `amount` execution gas.
    pub fn consume_exec_gas_for_executor(&mut self, identity: Identity, amount: u64) {
        self.exec_gas_remaining = self.exec_gas_remaining.saturating_sub(amount);
        self.executors.push(ExecutorGasUsed { identity, amount });
    }

    /// Remove the proxy gas already credited per execution from a committee
    /// member's self-reported gas.
    pub fn correct_exec_gas_report(&self, report: u64) -> u64 {
        report.saturating_sub(self.total_proxy_gas_per_exec)
    }

    /// Proxy credits, hash-sorted with entropy from the request id and the
    /// current height.
    pub fn sorted_proxies(&self, dr_id: &RequestId, height: u64) -> Vec<ProxyGasUsed> {
        let entropy = entropy(dr_id, height);
        hash_sort(self.proxies.clone(), Some(entropy.as_slice()))
    }

    /// Convert the meter into an ordered list of payouts.
    ///
    /// The first entry is always the burn of the tally gas used. In reduced
    /// payout mode `burn_ratio` of every executor credit is added to that
    /// burn instead of being paid out.
    pub fn read(
        &self,
        dr_id: &RequestId,
        height: u64,
        burn_ratio: Ratio<u64>,
    ) -> Vec<Distribution> {
        let price = self.gas_price;
        let mut distributions = Vec::with_capacity(1 + self.proxies.len() + self.executors.len());
        distributions.push(Distribution::Burn { amount: 0 });

        for proxy in self.sorted_proxies(dr_id, height) {
            distributions.push(Distribution::DataProxyReward {
                public_key: proxy.public_key,
                payout_address: proxy.payout_address,
                amount: (proxy.amount as u128).saturating_mul(price),
            });
        }

        let mut reduced_burn: u128 = 0;
        for executor in &self.executors {
            let mut payout = executor.amount as u128;
            if self.reduced_payout {
                let numer = *burn_ratio.numer() as u128;
                let denom = (*burn_ratio.denom()).max(1) as u128;
                let burn = (payout * numer / denom).min(payout);
                payout -= burn;
                reduced_burn += burn;
            }
            distributions.push(Distribution::ExecutorReward {
                identity: executor.identity.clone(),
                amount: payout.saturating_mul(price),
            });
        }

        let burned_gas = (self.tally_gas_used() as u128).saturating_add(reduced_burn);
        distributions[0] = Distribution::Burn {
            amount: burned_gas.saturating_mul(price),
        };
        debug!(
            %dr_id,
            tally_gas = self.tally_gas_used(),
            reduced_burn,
            reduced_payout = self.reduced_payout,
            "read gas meter"
        );
        distributions
    }
}

/// Entropy used to hash-sort participants of a request: `id || height`.
pub fn entropy(dr_id: &RequestId, height: u64) -> Vec<u8> {
    let mut entropy = Vec::with_capacity(dr_id.as_ref().len() + 8);
    entropy.extend_from_slice(dr_id.as_ref());
    entropy.extend_from_slice(&height.to_be_bytes());
    entropy
}
