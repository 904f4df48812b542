use crate::{
    engine::{REQUESTS, TIMEOUTS},
    verify::{reveal_message_hash, verify},
    Engine, Error, Host, ProofVerifier, TallyVm,
};
use commonware_utils::from_hex;
use oracle_primitives::{Identity, RevealBody, Status};
use oracle_store::kv::{transact, Kv};
use tracing::debug;

/// A committee member's disclosure of the result it committed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealSubmission {
    pub identity: Identity,
    pub body: RevealBody,
    /// Proof by `identity` over the reveal message hash.
    pub proof: Vec<u8>,
    pub stderr: Vec<String>,
    pub stdout: Vec<String>,
}

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    /// Record a reveal, moving the request to `Tallying` once the replication
    /// factor is reached.
    pub fn reveal(&mut self, submission: RevealSubmission, height: u64) -> Result<(), Error> {
        if self.state.paused {
            return Err(Error::Paused);
        }
        let RevealSubmission {
            identity,
            body,
            proof,
            stderr,
            stdout,
        } = submission;
        let id = body.dr_id;

        let mut request = REQUESTS.get(&self.db, &id)?;
        if request.status != Status::Revealing {
            return Err(Error::NotRevealing);
        }
        let timeout_height = request.timeout_height.ok_or(Error::MissingTimeout(id))?;
        if timeout_height <= height {
            return Err(Error::RevealTimeout(timeout_height));
        }
        if request.reveals.contains(&identity) {
            return Err(Error::AlreadyRevealed(identity));
        }
        let Some(commitment) = request.commits.get(&identity) else {
            return Err(Error::NotCommitted(identity));
        };

        if body.dr_block_height != request.height {
            return Err(Error::RevealBodyMismatch(id));
        }
        if body.commitment(&identity, &proof, &stderr, &stdout) != *commitment {
            return Err(Error::RevealMismatch);
        }
        let replication_factor = request.replication_factor().max(1) as usize;
        let limit = self.params.protocol.dr_reveal_size_limit_in_bytes / replication_factor;
        if body.reveal.len() > limit {
            return Err(Error::RevealTooBig(body.reveal.len(), limit));
        }
        if let Some(key) = body.proxy_pub_keys.iter().find(|key| from_hex(key).is_none()) {
            return Err(Error::InvalidProxyPublicKey(key.clone()));
        }

        let message = reveal_message_hash(&body, &self.config.chain_id, &self.config.domain);
        verify(&self.verifier, &identity, &message, &proof)?;

        request.reveals.insert(identity.clone());
        let complete = request.reveals.len() >= request.replication_factor() as usize;
        transact(&mut self.db, |batch| {
            REQUESTS.set_reveal_body(batch, &id, &identity, &body);
            if !complete {
                return REQUESTS.update(batch, &mut request, None);
            }
            TIMEOUTS.remove(batch, &id, timeout_height)?;
            request.timeout_height = None;
            REQUESTS.update(batch, &mut request, Some(Status::Tallying))
        })?;

        self.host.refund_fee(&identity, &id);
        self.metrics.reveals.inc();
        debug!(
            %id,
            %identity,
            reveals = request.reveals.len(),
            status = %request.status,
            "accepted reveal"
        );
        Ok(())
    }
}
