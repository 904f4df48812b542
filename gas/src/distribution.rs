use oracle_primitives::Identity;

/// A single payout instruction produced by [crate::GasMeter::read].
///
/// Amounts are in the bond denomination (gas multiplied by the posted gas
/// price) and are capped against the remaining escrow when settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Distribution {
    Burn {
        amount: u128,
    },
    DataProxyReward {
        public_key: String,
        payout_address: String,
        amount: u128,
    },
    ExecutorReward {
        identity: Identity,
        amount: u128,
    },
}

impl Distribution {
    /// Amount moved by the instruction.
    pub fn amount(&self) -> u128 {
        match self {
            Distribution::Burn { amount }
            | Distribution::DataProxyReward { amount, .. }
            | Distribution::ExecutorReward { amount, .. } => *amount,
        }
    }
}
