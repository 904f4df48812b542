use crate::{tally::Payouts, Config, Error, Host, Metrics, Params, ProofVerifier, State, TallyVm};
use oracle_primitives::RequestId;
use oracle_store::{
    collection::Map, kv::Kv, requests::RequestIndexStore, timeouts::TimeoutQueue,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

/// Data requests, their reveal bodies and status index.
pub(crate) const REQUESTS: RequestIndexStore = RequestIndexStore::new();

/// Commit and reveal phase deadlines.
pub(crate) const TIMEOUTS: TimeoutQueue = TimeoutQueue::new();

/// Payouts of finalized requests that the ledger has not yet applied.
pub(crate) const PAYOUTS: Map<RequestId, Payouts> = Map::new(0x05);

/// Oracle engine over a key-value store `D`, the chain it runs on `H`, a
/// proof verifier `V`, and a tally program executor `M`.
///
/// Handlers take the current block height explicitly and either apply all of
/// their changes or none of them.
pub struct Engine<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> {
    pub(crate) db: D,
    pub(crate) host: H,
    pub(crate) verifier: V,
    pub(crate) vm: M,
    pub(crate) params: Params,
    pub(crate) state: State,
    pub(crate) config: Config,
    pub(crate) metrics: Metrics,
    pub(crate) pool: Option<ThreadPool>,
}

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    /// Create a new engine.
    ///
    /// Fails if `params` are invalid or the tally thread pool cannot be built.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: D,
        host: H,
        verifier: V,
        vm: M,
        params: Params,
        state: State,
        config: Config,
        metrics: Metrics,
    ) -> Result<Self, Error> {
        params.validate()?;
        let pool = if config.tally_concurrency > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.tally_concurrency)
                .build()
                .map_err(|err| Error::ThreadPool(err.to_string()))?;
            Some(pool)
        } else {
            None
        };
        info!(
            chain_id = config.chain_id,
            tally_concurrency = config.tally_concurrency,
            owner = state.owner,
            "initialized engine"
        );
        Ok(Self {
            db,
            host,
            verifier,
            vm,
            params,
            state,
            config,
            metrics,
            pool,
        })
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn vm(&self) -> &M {
        &self.vm
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
