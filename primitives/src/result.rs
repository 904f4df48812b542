use crate::{hash, RequestId};

/// Canonical, finalized outcome of a data request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataResult {
    /// Content hash of the result (see [DataResult::compute_id]).
    pub id: RequestId,
    pub dr_id: RequestId,
    /// Height at which the request was posted.
    pub dr_block_height: u64,
    pub version: String,
    /// Height at which the result was finalized.
    pub block_height: u64,
    pub block_timestamp: u64,
    pub consensus: bool,
    pub exit_code: u8,
    pub gas_used: u128,
    pub result: Vec<u8>,
    pub payback_address: Vec<u8>,
    pub seda_payload: Vec<u8>,
}

impl DataResult {
    /// Content hash over every field except `id` and `dr_block_height`.
    pub fn compute_id(&self) -> RequestId {
        RequestId::new(hash(&[
            hash(&[self.version.as_bytes()]).as_slice(),
            self.dr_id.as_ref(),
            &[self.consensus as u8],
            &[self.exit_code],
            &hash(&[self.result.as_slice()]),
            &self.block_height.to_be_bytes(),
            &self.block_timestamp.to_be_bytes(),
            &self.gas_used.to_be_bytes(),
            &hash(&[self.payback_address.as_slice()]),
            &hash(&[self.seda_payload.as_slice()]),
        ]))
    }

    /// Recompute and store the content hash.
    pub fn seal(mut self) -> Self {
        self.id = self.compute_id();
        self
    }
}
