//! Posted request bodies and their lifecycle records.

use crate::{
    hash, wire, Commitment, DataRequestIndex, Identity, ProgramId, RequestId, Status,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of commits or reveals decoded for a single request.
const MAX_PARTICIPANTS: usize = u16::MAX as usize;

/// The immutable part of a data request, as supplied by its poster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestBody {
    /// Semantic version (`MAJOR.MINOR.PATCH`) of the request format.
    pub version: String,
    /// Program executed off-chain by each committee member.
    pub exec_program_id: ProgramId,
    pub exec_inputs: Vec<u8>,
    pub exec_gas_limit: u64,
    /// Program executed on-chain over the agreed reveals.
    pub tally_program_id: ProgramId,
    pub tally_inputs: Vec<u8>,
    pub tally_gas_limit: u64,
    /// Number of participants required to advance each phase.
    pub replication_factor: u16,
    /// Filter discriminator byte followed by filter-specific parameters.
    pub consensus_filter: Vec<u8>,
    pub gas_price: u128,
    pub memo: Vec<u8>,
    pub payback_address: Vec<u8>,
    pub seda_payload: Vec<u8>,
}

impl RequestBody {
    /// Content hash identifying the request.
    ///
    /// Variable-length inputs are folded in by their own hash so that the
    /// id commits to every field without ambiguity between adjacent fields.
    pub fn id(&self) -> RequestId {
        let price = self.gas_price.to_be_bytes();
        let leading = price.iter().take_while(|b| **b == 0).count();
        RequestId::new(hash(&[
            self.version.as_bytes(),
            self.exec_program_id.as_ref(),
            &hash(&[&self.exec_inputs]),
            &self.exec_gas_limit.to_be_bytes(),
            self.tally_program_id.as_ref(),
            &hash(&[&self.tally_inputs]),
            &self.tally_gas_limit.to_be_bytes(),
            &self.replication_factor.to_be_bytes(),
            &hash(&[&self.consensus_filter]),
            &price[leading..],
            &hash(&[&self.memo]),
        ]))
    }
}

impl Write for RequestBody {
    fn write(&self, buf: &mut impl BufMut) {
        wire::write_str(&self.version, buf);
        self.exec_program_id.write(buf);
        wire::write_bytes(&self.exec_inputs, buf);
        self.exec_gas_limit.write(buf);
        self.tally_program_id.write(buf);
        wire::write_bytes(&self.tally_inputs, buf);
        self.tally_gas_limit.write(buf);
        self.replication_factor.write(buf);
        wire::write_bytes(&self.consensus_filter, buf);
        self.gas_price.write(buf);
        wire::write_bytes(&self.memo, buf);
        wire::write_bytes(&self.payback_address, buf);
        wire::write_bytes(&self.seda_payload, buf);
    }
}

impl Read for RequestBody {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            version: wire::read_str(buf, wire::MAX_FIELD_LENGTH)?,
            exec_program_id: ProgramId::read(buf)?,
            exec_inputs: wire::read_bytes(buf, wire::MAX_FIELD_LENGTH)?,
            exec_gas_limit: u64::read(buf)?,
            tally_program_id: ProgramId::read(buf)?,
            tally_inputs: wire::read_bytes(buf, wire::MAX_FIELD_LENGTH)?,
            tally_gas_limit: u64::read(buf)?,
            replication_factor: u16::read(buf)?,
            consensus_filter: wire::read_bytes(buf, wire::MAX_FIELD_LENGTH)?,
            gas_price: u128::read(buf)?,
            memo: wire::read_bytes(buf, wire::MAX_FIELD_LENGTH)?,
            payback_address: wire::read_bytes(buf, wire::MAX_FIELD_LENGTH)?,
            seda_payload: wire::read_bytes(buf, wire::MAX_FIELD_LENGTH)?,
        })
    }
}

impl EncodeSize for RequestBody {
    fn encode_size(&self) -> usize {
        wire::bytes_size(self.version.as_bytes())
            + self.exec_program_id.encode_size()
            + wire::bytes_size(&self.exec_inputs)
            + 8
            + self.tally_program_id.encode_size()
            + wire::bytes_size(&self.tally_inputs)
            + 8
            + 2
            + wire::bytes_size(&self.consensus_filter)
            + 16
            + wire::bytes_size(&self.memo)
            + wire::bytes_size(&self.payback_address)
            + wire::bytes_size(&self.seda_payload)
    }
}

/// A data request tracked by the engine from posting until its result is
/// finalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataRequest {
    pub id: RequestId,
    pub body: RequestBody,
    /// Account that posted (and funded) the request.
    pub poster: String,
    /// Price actually paid per unit of gas, derived from the attached funds.
    pub posted_gas_price: u128,
    /// Height at which the request was posted.
    pub height: u64,
    /// Height at which the current phase is forcibly ended.
    ///
    /// `None` once the request can no longer time out.
    pub timeout_height: Option<u64>,
    pub status: Status,
    /// Funds reserved to pay for the request.
    pub escrow: u128,
    pub commits: BTreeMap<Identity, Commitment>,
    pub reveals: BTreeSet<Identity>,
}

impl DataRequest {
    /// Sort key of the request within its status.
    pub fn index(&self) -> DataRequestIndex {
        DataRequestIndex::new(self.posted_gas_price, self.height, &self.id)
    }

    /// Required number of participants.
    pub fn replication_factor(&self) -> u16 {
        self.body.replication_factor
    }
}

impl Write for DataRequest {
    fn write(&self, buf: &mut impl BufMut) {
        self.id.write(buf);
        self.body.write(buf);
        wire::write_str(&self.poster, buf);
        self.posted_gas_price.write(buf);
        self.height.write(buf);
        match self.timeout_height {
            Some(height) => {
                buf.put_u8(1);
                height.write(buf);
            }
            None => buf.put_u8(0),
        }
        self.status.write(buf);
        self.escrow.write(buf);
        (self.commits.len() as u32).write(buf);
        for (identity, commitment) in &self.commits {
            identity.write(buf);
            commitment.write(buf);
        }
        (self.reveals.len() as u32).write(buf);
        for identity in &self.reveals {
            identity.write(buf);
        }
    }
}

impl Read for DataRequest {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let id = RequestId::read(buf)?;
        let body = RequestBody::read(buf)?;
        let poster = wire::read_str(buf, wire::MAX_FIELD_LENGTH)?;
        let posted_gas_price = u128::read(buf)?;
        let height = u64::read(buf)?;
        let timeout_height = match u8::read(buf)? {
            0 => None,
            1 => Some(u64::read(buf)?),
            _ => return Err(CodecError::Invalid("DataRequest", "invalid timeout tag")),
        };
        let status = Status::read(buf)?;
        let escrow = u128::read(buf)?;

        let commit_count = u32::read(buf)? as usize;
        if commit_count > MAX_PARTICIPANTS {
            return Err(CodecError::Invalid("DataRequest", "too many commits"));
        }
        let mut commits = BTreeMap::new();
        for _ in 0..commit_count {
            let identity = Identity::read(buf)?;
            let commitment = Commitment::read(buf)?;
            if commits.insert(identity, commitment).is_some() {
                return Err(CodecError::Invalid("DataRequest", "duplicate commit"));
            }
        }

        let reveal_count = u32::read(buf)? as usize;
        if reveal_count > MAX_PARTICIPANTS {
            return Err(CodecError::Invalid("DataRequest", "too many reveals"));
        }
        let mut reveals = BTreeSet::new();
        for _ in 0..reveal_count {
            if !reveals.insert(Identity::read(buf)?) {
                return Err(CodecError::Invalid("DataRequest", "duplicate reveal"));
            }
        }

        Ok(Self {
            id,
            body,
            poster,
            posted_gas_price,
            height,
            timeout_height,
            status,
            escrow,
            commits,
            reveals,
        })
    }
}

impl EncodeSize for DataRequest {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + self.body.encode_size()
            + wire::bytes_size(self.poster.as_bytes())
            + 16
            + 8
            + 1
            + self.timeout_height.map_or(0, |_| 8)
            + self.status.encode_size()
            + 16
            + 4
            + self
                .commits
                .iter()
                .map(|(identity, commitment)| identity.encode_size() + commitment.encode_size())
                .sum::<usize>()
            + 4
            + self
                .reveals
                .iter()
                .map(|identity| identity.encode_size())
                .sum::<usize>()
    }
}
