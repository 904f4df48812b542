//! In-memory collaborators for testing the engine.
//!
//! [Chain] implements every host trait over plain maps, [Vm] stands in for
//! the tally program executor, and [Executor] produces correctly signed
//! commit and reveal submissions.

use crate::{
    params::{MIN_EXEC_GAS_LIMIT, MIN_GAS_PRICE, MIN_TALLY_GAS_LIMIT},
    verify::{commit_message_hash, reveal_message_hash},
    Coin, CommitSubmission, Config, DataProxies, Domain, Ed25519Verifier, Engine, Error, Ledger,
    Metrics, Params, PostRequest, Programs, ProxyConfig, ResultSink, RevealSubmission, Staker,
    Staking, State, TallyVm, VmResult,
};
use commonware_cryptography::{ed25519, PrivateKeyExt, Signer};
use commonware_utils::hex;
use oracle_primitives::{DataResult, Identity, ProgramId, RequestId, RevealBody};
use oracle_store::kv::Memory;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicUsize, Ordering},
};

/// Owner of engines built by [engine].
pub const OWNER: &str = "owner";

/// Account posting requests.
pub const POSTER: &str = "poster";

/// Bond denomination of [Chain].
pub const DENOM: &str = "aoracle";

/// Balance of [POSTER] on a fresh [Chain].
pub const INITIAL_BALANCE: u128 = 1_000_000_000_000_000_000_000_000;

/// Chain id of engines built by [engine].
pub const CHAIN_ID: &str = "oracle-test";

/// Tally program registered on every [Chain].
pub const TALLY_PROGRAM: ProgramId = ProgramId::new([2; 32]);

/// Execution program referenced by [post_request].
pub const EXEC_PROGRAM: ProgramId = ProgramId::new([1; 32]);

/// Gas reported by reveal bodies built with [body].
pub const GAS_REPORT: u64 = 1_000_000_000_000;

/// An in-memory chain.
#[derive(Debug, Default)]
pub struct Chain {
    balances: BTreeMap<String, u128>,
    module: u128,
    burned: u128,
    stakers: BTreeMap<Identity, Staker>,
    allowlist: BTreeSet<Identity>,
    proxies: BTreeMap<Vec<u8>, ProxyConfig>,
    programs: BTreeMap<ProgramId, Vec<u8>>,
    results: Vec<DataResult>,
    fee_refunds: Vec<(Identity, RequestId)>,
    fail_ledger: bool,
    fail_results: bool,
}

impl Chain {
    /// A chain where [POSTER] holds [INITIAL_BALANCE] and [TALLY_PROGRAM]
    /// is registered.
    pub fn new() -> Self {
        let mut chain = Self::default();
        chain.balances.insert(POSTER.to_string(), INITIAL_BALANCE);
        chain.programs.insert(TALLY_PROGRAM, b"tally".to_vec());
        chain
    }

    pub fn balance(&self, account: &str) -> u128 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Funds held by the module account.
    ///
    /// Rewards credited to stakers stay here, backing their stake.
    pub fn module_balance(&self) -> u128 {
        self.module
    }

    pub fn fund_module(&mut self, amount: u128) {
        self.module += amount;
    }

    pub fn burned(&self) -> u128 {
        self.burned
    }

    pub fn add_staker(&mut self, identity: &Identity, staked: u128) {
        self.stakers.insert(
            identity.clone(),
            Staker {
                staked,
                pending_withdrawal: 0,
            },
        );
    }

    pub fn remove_staker(&mut self, identity: &Identity) {
        self.stakers.remove(identity);
    }

    pub fn add_proxy(&mut self, public_key: &[u8], config: ProxyConfig) {
        self.proxies.insert(public_key.to_vec(), config);
    }

    pub fn add_program(&mut self, id: ProgramId, program: Vec<u8>) {
        self.programs.insert(id, program);
    }

    pub fn remove_program(&mut self, id: &ProgramId) {
        self.programs.remove(id);
    }

    /// Results emitted so far.
    pub fn results(&self) -> &[DataResult] {
        &self.results
    }

    /// Commit and reveal fees refunded so far.
    pub fn fee_refunds(&self) -> &[(Identity, RequestId)] {
        &self.fee_refunds
    }

    /// Make every token movement fail (or succeed again).
    pub fn fail_ledger(&mut self, fail: bool) {
        self.fail_ledger = fail;
    }

    /// Make every result emission fail (or succeed again).
    pub fn fail_results(&mut self, fail: bool) {
        self.fail_results = fail;
    }

    fn debit_module(&mut self, amount: u128) -> Result<(), Error> {
        if self.fail_ledger {
            return Err(Error::Ledger("ledger unavailable".into()));
        }
        self.module = self
            .module
            .checked_sub(amount)
            .ok_or_else(|| Error::Ledger("insufficient module balance".into()))?;
        Ok(())
    }
}

impl Ledger for Chain {
    fn bond_denom(&self) -> String {
        DENOM.to_string()
    }

    fn escrow(&mut self, from: &str, amount: u128) -> Result<(), Error> {
        if self.fail_ledger {
            return Err(Error::Ledger("ledger unavailable".into()));
        }
        let balance = self.balances.entry(from.to_string()).or_default();
        *balance = balance
            .checked_sub(amount)
            .ok_or_else(|| Error::Ledger(format!("insufficient balance: {from}")))?;
        self.module += amount;
        Ok(())
    }

    fn send(&mut self, to: &str, amount: u128) -> Result<(), Error> {
        self.debit_module(amount)?;
        *self.balances.entry(to.to_string()).or_default() += amount;
        Ok(())
    }

    fn burn(&mut self, amount: u128) -> Result<(), Error> {
        self.debit_module(amount)?;
        self.burned += amount;
        Ok(())
    }

    fn refund_fee(&mut self, identity: &Identity, request: &RequestId) {
        self.fee_refunds.push((identity.clone(), *request));
    }
}

impl Staking for Chain {
    fn staker(&self, identity: &Identity) -> Option<Staker> {
        self.stakers.get(identity).copied()
    }

    fn set_staker(&mut self, identity: &Identity, staker: Staker) -> Result<(), Error> {
        self.stakers.insert(identity.clone(), staker);
        Ok(())
    }

    fn staker_count(&self) -> u32 {
        self.stakers.len() as u32
    }

    fn is_allowlisted(&self, identity: &Identity) -> bool {
        self.allowlist.contains(identity)
    }

    fn set_allowlisted(&mut self, identity: &Identity, allowlisted: bool) {
        if allowlisted {
            self.allowlist.insert(identity.clone());
        } else {
            self.allowlist.remove(identity);
        }
    }
}

impl DataProxies for Chain {
    fn proxy_config(&self, public_key: &[u8]) -> Option<ProxyConfig> {
        self.proxies.get(public_key).cloned()
    }
}

impl Programs for Chain {
    fn program(&self, id: &ProgramId) -> Option<Vec<u8>> {
        self.programs.get(id).cloned()
    }
}

impl ResultSink for Chain {
    fn emit(&mut self, result: &DataResult) -> Result<(), Error> {
        if self.fail_results {
            return Err(Error::ResultSink("result sink unavailable".into()));
        }
        self.results.push(result.clone());
        Ok(())
    }
}

/// Tally program executor that returns the reveal of the first non-outlier.
#[derive(Debug, Default)]
pub struct Vm {
    gas_used: u64,
    exit_code: u8,
    result: Option<Vec<u8>>,
    calls: AtomicUsize,
}

impl Vm {
    /// Report `gas_used` (capped at the gas limit) for every execution.
    pub fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = gas_used;
        self
    }

    pub fn with_exit_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Return `result` instead of the first agreed reveal.
    pub fn with_result(mut self, result: Vec<u8>) -> Self {
        self.result = Some(result);
        self
    }

    /// Number of executions so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn first_agreed_reveal(args: &[String]) -> Option<Vec<u8>> {
        let reveals: serde_json::Value = serde_json::from_str(args.get(1)?).ok()?;
        let outliers: Vec<u8> = serde_json::from_str(args.get(2)?).ok()?;
        let position = outliers.iter().position(|outlier| *outlier == 0)?;
        reveals
            .get(position)?
            .get("reveal")?
            .as_array()?
            .iter()
            .map(|byte| byte.as_u64().and_then(|byte| u8::try_from(byte).ok()))
            .collect()
    }
}

impl TallyVm for Vm {
    fn execute(
        &self,
        _program: &[u8],
        args: &[String],
        env: &BTreeMap<String, String>,
        gas_limit: u64,
    ) -> VmResult {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let result = match &self.result {
            Some(result) => result.clone(),
            None => Self::first_agreed_reveal(args).unwrap_or_default(),
        };
        VmResult {
            stdout: vec![format!("consensus: {}", env.get("CONSENSUS").map_or("", String::as_str))],
            stderr: Vec::new(),
            result,
            exit_code: self.exit_code,
            exit_message: format!("exited with {}", self.exit_code),
            gas_used: self.gas_used.min(gas_limit),
        }
    }
}

/// A committee member signing with an ed25519 key.
#[derive(Clone)]
pub struct Executor {
    key: ed25519::PrivateKey,
    pub identity: Identity,
}

impl Executor {
    pub fn new(seed: u64) -> Self {
        let key = ed25519::PrivateKey::from_seed(seed);
        let identity = Identity::new(key.public_key().as_ref().to_vec());
        Self { key, identity }
    }

    /// Sign `body` for reveal.
    pub fn reveal(&self, body: RevealBody) -> RevealSubmission {
        let message = reveal_message_hash(&body, CHAIN_ID, &Domain::Current);
        let proof = self.key.sign(None, &message).as_ref().to_vec();
        RevealSubmission {
            identity: self.identity.clone(),
            body,
            proof,
            stderr: Vec::new(),
            stdout: Vec::new(),
        }
    }

    /// Commit to `reveal` for a request posted at `posted_height`.
    pub fn commit(&self, reveal: &RevealSubmission, posted_height: u64) -> CommitSubmission {
        let commitment = reveal.body.commitment(
            &self.identity,
            &reveal.proof,
            &reveal.stderr,
            &reveal.stdout,
        );
        let message = commit_message_hash(
            &reveal.body.dr_id,
            posted_height,
            &commitment,
            CHAIN_ID,
            &Domain::Current,
        );
        CommitSubmission {
            request_id: reveal.body.dr_id,
            identity: self.identity.clone(),
            commitment,
            proof: self.key.sign(None, &message).as_ref().to_vec(),
        }
    }
}

/// Executors seeded `0..n`.
pub fn executors(n: u64) -> Vec<Executor> {
    (0..n).map(Executor::new).collect()
}

/// A [Chain] where the first `stakers` [executors] hold the minimum stake.
pub fn host(stakers: u64) -> Chain {
    let mut chain = Chain::new();
    for executor in executors(stakers) {
        chain.add_staker(&executor.identity, 1);
    }
    chain
}

/// Engine used throughout the tests.
pub type TestEngine = Engine<Memory, Chain, Ed25519Verifier, Vm>;

/// An engine with default parameters over `chain`.
pub fn engine(chain: Chain) -> TestEngine {
    engine_with(chain, Vm::default(), 1)
}

/// An engine over `chain` and `vm`, executing tally programs on
/// `tally_concurrency` threads.
pub fn engine_with(chain: Chain, vm: Vm, tally_concurrency: usize) -> TestEngine {
    let config = Config {
        chain_id: CHAIN_ID.to_string(),
        domain: Domain::Current,
        tally_concurrency,
    };
    Engine::new(
        Memory::default(),
        chain,
        Ed25519Verifier,
        vm,
        Params::default(),
        State::new(OWNER),
        config,
        Metrics::default(),
    )
    .expect("valid engine configuration")
}

/// A valid request with the minimum gas price and limits and no filtering.
pub fn post_request(replication_factor: u16) -> PostRequest {
    PostRequest {
        version: "0.0.1".into(),
        exec_program_id: hex(EXEC_PROGRAM.as_ref()),
        exec_inputs: b"inputs".to_vec(),
        exec_gas_limit: MIN_EXEC_GAS_LIMIT,
        tally_program_id: hex(TALLY_PROGRAM.as_ref()),
        tally_inputs: Vec::new(),
        tally_gas_limit: MIN_TALLY_GAS_LIMIT,
        replication_factor,
        consensus_filter: vec![0x00],
        gas_price: MIN_GAS_PRICE,
        memo: Vec::new(),
        payback_address: Vec::new(),
        seda_payload: Vec::new(),
    }
}

/// Exactly the funds `request` requires.
pub fn funds(request: &PostRequest) -> Coin {
    let gas = request.exec_gas_limit as u128 + request.tally_gas_limit as u128;
    Coin {
        denom: DENOM.to_string(),
        amount: request.gas_price * gas,
    }
}

/// Post [post_request] with `memo` at `height`.
pub fn post(
    engine: &mut TestEngine,
    replication_factor: u16,
    height: u64,
    memo: &[u8],
) -> RequestId {
    let mut request = post_request(replication_factor);
    request.memo = memo.to_vec();
    let funds = funds(&request);
    engine
        .post_request(POSTER, request, &funds, height)
        .expect("valid request")
        .request_id
}

/// An engine with `stakers` staked [executors] and one posted request.
pub fn posted(stakers: u64, replication_factor: u16, height: u64) -> (TestEngine, RequestId) {
    let mut engine = engine(host(stakers));
    let id = post(&mut engine, replication_factor, height, &[]);
    (engine, id)
}

/// A successful reveal body for request `id` posted at `height`.
pub fn body(id: &RequestId, height: u64, reveal: &[u8]) -> RevealBody {
    RevealBody {
        dr_id: *id,
        dr_block_height: height,
        exit_code: 0,
        gas_used: GAS_REPORT,
        reveal: reveal.to_vec(),
        proxy_pub_keys: Vec::new(),
    }
}
