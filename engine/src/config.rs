use crate::Domain;

/// Mutable module state, changed only through the admin handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct State {
    /// Account allowed to pause the module, manage the allowlist, and update
    /// parameters.
    pub owner: String,
    /// Account that may accept ownership, if a transfer was started.
    pub pending_owner: Option<String>,
    /// While paused, no request can be posted, committed, or revealed, and
    /// tallied requests are refunded in full.
    pub paused: bool,
}

impl State {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            pending_owner: None,
            paused: false,
        }
    }
}

/// Configuration for the [crate::Engine].
#[derive(Clone, Debug)]
pub struct Config {
    /// Identifier of the chain, bound into every commit and reveal proof.
    pub chain_id: String,

    /// Domain separation of commit and reveal proofs.
    pub domain: Domain,

    /// Number of threads used to execute tally programs.
    ///
    /// With a value of 1 or less, tally programs are executed on the caller's
    /// thread.
    pub tally_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: "oracle-1".into(),
            domain: Domain::Current,
            tally_concurrency: 1,
        }
    }
}
