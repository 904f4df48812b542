use crate::{
    engine::{REQUESTS, TIMEOUTS},
    Engine, Error, Host, ProofVerifier, TallyVm,
};
use oracle_primitives::Status;
use oracle_store::kv::{transact, Kv};
use tracing::debug;

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    /// Force every request whose phase ended at or before `height` into
    /// `Tallying`, returning how many were expired.
    ///
    /// Either every due request is expired or none is.
    pub(crate) fn expire(&mut self, height: u64) -> Result<usize, Error> {
        let expired = transact(&mut self.db, |batch| {
            let due = TIMEOUTS.due(&*batch, height)?;
            for entry in &due {
                TIMEOUTS.remove(batch, &entry.id, entry.height)?;
                let mut request = REQUESTS.get(&*batch, &entry.id)?;
                let from = request.status;
                request.timeout_height = None;
                REQUESTS.update(batch, &mut request, Some(Status::Tallying))?;
                debug!(
                    id = %entry.id,
                    timeout_height = entry.height,
                    %from,
                    commits = request.commits.len(),
                    reveals = request.reveals.len(),
                    "expired data request"
                );
            }
            Ok::<_, Error>(due.len())
        })?;
        self.metrics.requests_expired.inc_by(expired as u64);
        Ok(expired)
    }
}
