use crate::{
    engine::{REQUESTS, TIMEOUTS},
    verify::{commit_message_hash, verify},
    Engine, Error, Host, ProofVerifier, TallyVm,
};
use oracle_primitives::{Commitment, Identity, RequestId, Status};
use oracle_store::kv::{transact, Kv};
use tracing::debug;

/// A committee member's commitment to the result of its execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSubmission {
    pub request_id: RequestId,
    pub identity: Identity,
    pub commitment: Commitment,
    /// Proof by `identity` over the commit message hash.
    pub proof: Vec<u8>,
}

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    /// Record a commitment, moving the request to `Revealing` once the
    /// replication factor is reached.
    pub fn commit(&mut self, submission: CommitSubmission, height: u64) -> Result<(), Error> {
        if self.state.paused {
            return Err(Error::Paused);
        }
        let CommitSubmission {
            request_id,
            identity,
            commitment,
            proof,
        } = submission;

        let mut request = REQUESTS.get(&self.db, &request_id)?;
        if request.status != Status::Committing {
            return Err(Error::NotCommitting);
        }
        if request.commits.contains_key(&identity) {
            return Err(Error::AlreadyCommitted(identity));
        }
        let timeout_height = request
            .timeout_height
            .ok_or(Error::MissingTimeout(request_id))?;
        if timeout_height <= height {
            return Err(Error::CommitTimeout(timeout_height));
        }

        let staking = &self.params.staking;
        let staker = self
            .host
            .staker(&identity)
            .ok_or_else(|| Error::NotStaker(identity.clone()))?;
        if staking.allowlist_enabled && !self.host.is_allowlisted(&identity) {
            return Err(Error::NotAllowlisted(identity));
        }
        if staker.staked < staking.minimum_stake {
            return Err(Error::InsufficientStake(
                staker.staked,
                staking.minimum_stake,
            ));
        }

        let message = commit_message_hash(
            &request_id,
            request.height,
            &commitment,
            &self.config.chain_id,
            &self.config.domain,
        );
        verify(&self.verifier, &identity, &message, &proof)?;

        request.commits.insert(identity.clone(), commitment);
        let complete = request.commits.len() >= request.replication_factor() as usize;
        let reveal_timeout = height.saturating_add(self.params.protocol.reveal_timeout_in_blocks);
        transact(&mut self.db, |batch| {
            if !complete {
                return REQUESTS.update(batch, &mut request, None);
            }
            TIMEOUTS.update(batch, &request_id, timeout_height, reveal_timeout)?;
            request.timeout_height = Some(reveal_timeout);
            REQUESTS.update(batch, &mut request, Some(Status::Revealing))
        })?;

        self.host.refund_fee(&identity, &request_id);
        self.metrics.commits.inc();
        debug!(
            id = %request_id,
            %identity,
            commits = request.commits.len(),
            status = %request.status,
            "accepted commit"
        );
        Ok(())
    }
}
