use crate::{Error, Ledger, Staking};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use oracle_gas::Distribution;
use oracle_primitives::{wire, DataRequest, Identity};
use tracing::debug;

/// Maximum number of payouts decoded for a single request.
const MAX_PAYOUTS: usize = u16::MAX as usize;

/// Where the escrow of a finalized request went.
///
/// The four amounts always add up to the escrow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Settlement {
    pub burned: u128,
    pub proxy_rewards: u128,
    pub executor_rewards: u128,
    /// Returned to the poster.
    pub refunded: u128,
}

impl Settlement {
    pub fn total(&self) -> u128 {
        self.burned
            .saturating_add(self.proxy_rewards)
            .saturating_add(self.executor_rewards)
            .saturating_add(self.refunded)
    }
}

/// A single movement of escrow out of the module account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Payout {
    Burn(u128),
    Send { to: String, amount: u128 },
    /// Credited to a staker. Stake is held by the module account, so no
    /// tokens move.
    Reward { identity: Identity, amount: u128 },
}

impl Write for Payout {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Payout::Burn(amount) => {
                buf.put_u8(0);
                amount.write(buf);
            }
            Payout::Send { to, amount } => {
                buf.put_u8(1);
                wire::write_str(to, buf);
                amount.write(buf);
            }
            Payout::Reward { identity, amount } => {
                buf.put_u8(2);
                identity.write(buf);
                amount.write(buf);
            }
        }
    }
}

impl Read for Payout {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        match u8::read(buf)? {
            0 => Ok(Payout::Burn(u128::read(buf)?)),
            1 => {
                let to = wire::read_str(buf, wire::MAX_FIELD_LENGTH)?;
                let amount = u128::read(buf)?;
                Ok(Payout::Send { to, amount })
            }
            2 => {
                let identity = Identity::read(buf)?;
                let amount = u128::read(buf)?;
                Ok(Payout::Reward { identity, amount })
            }
            _ => Err(CodecError::Invalid("Payout", "invalid tag")),
        }
    }
}

impl EncodeSize for Payout {
    fn encode_size(&self) -> usize {
        1 + match self {
            Payout::Burn(_) => 16,
            Payout::Send { to, .. } => wire::bytes_size(to.as_bytes()) + 16,
            Payout::Reward { identity, .. } => identity.encode_size() + 16,
        }
    }
}

/// Payouts of a finalized request not yet applied, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Payouts(pub Vec<Payout>);

impl Write for Payouts {
    fn write(&self, buf: &mut impl BufMut) {
        (self.0.len() as u32).write(buf);
        for payout in &self.0 {
            payout.write(buf);
        }
    }
}

impl Read for Payouts {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let count = u32::read(buf)? as usize;
        if count > MAX_PAYOUTS {
            return Err(CodecError::Invalid("Payouts", "too many payouts"));
        }
        let mut payouts = Vec::with_capacity(count);
        for _ in 0..count {
            payouts.push(Payout::read(buf)?);
        }
        Ok(Self(payouts))
    }
}

impl EncodeSize for Payouts {
    fn encode_size(&self) -> usize {
        4 + self.0.iter().map(EncodeSize::encode_size).sum::<usize>()
    }
}

/// Turn `distributions` into payouts from the escrow of `request`, followed
/// by a refund of what is left to the poster.
///
/// Each payout is capped at the escrow remaining when it is reached. Nothing
/// is moved: fails if a rewarded executor is not a staker.
pub(crate) fn plan<S: Staking>(
    staking: &S,
    request: &DataRequest,
    distributions: &[Distribution],
) -> Result<(Settlement, Payouts), Error> {
    let mut remaining = request.escrow;
    let mut settlement = Settlement::default();
    let mut payouts = Vec::with_capacity(distributions.len() + 1);
    for distribution in distributions {
        let amount = distribution.amount().min(remaining);
        if amount == 0 {
            continue;
        }
        match distribution {
            Distribution::Burn { .. } => {
                payouts.push(Payout::Burn(amount));
                settlement.burned += amount;
            }
            Distribution::DataProxyReward {
                public_key,
                payout_address,
                ..
            } => {
                payouts.push(Payout::Send {
                    to: payout_address.clone(),
                    amount,
                });
                settlement.proxy_rewards += amount;
                debug!(id = %request.id, public_key, payout_address, amount, "paying data proxy");
            }
            Distribution::ExecutorReward { identity, .. } => {
                if staking.staker(identity).is_none() {
                    return Err(Error::NotStaker(identity.clone()));
                }
                payouts.push(Payout::Reward {
                    identity: identity.clone(),
                    amount,
                });
                settlement.executor_rewards += amount;
            }
        }
        remaining -= amount;
    }
    if remaining > 0 {
        payouts.push(Payout::Send {
            to: request.poster.clone(),
            amount: remaining,
        });
    }
    settlement.refunded = remaining;
    Ok((settlement, Payouts(payouts)))
}

/// Apply a single payout.
pub(crate) fn pay<H: Ledger + Staking>(
    host: &mut H,
    payout: &Payout,
    minimum_stake: u128,
) -> Result<(), Error> {
    match payout {
        Payout::Burn(amount) => host.burn(*amount),
        Payout::Send { to, amount } => host.send(to, *amount),
        Payout::Reward { identity, amount } => {
            reward_executor(host, identity, *amount, minimum_stake)
        }
    }
}

/// Top the executor's stake up to `minimum_stake` and make the rest
/// withdrawable.
fn reward_executor<S: Staking>(
    staking: &mut S,
    identity: &Identity,
    amount: u128,
    minimum_stake: u128,
) -> Result<(), Error> {
    let mut staker = staking
        .staker(identity)
        .ok_or_else(|| Error::NotStaker(identity.clone()))?;
    let top_up = minimum_stake.saturating_sub(staker.staked).min(amount);
    staker.staked = staker.staked.saturating_add(top_up);
    staker.pending_withdrawal = staker.pending_withdrawal.saturating_add(amount - top_up);
    debug!(%identity, amount, top_up, "rewarded executor");
    staking.set_staker(identity, staker)
}
