use crate::{hash, wire, Commitment, HashSortable, Identity, RequestId, DIGEST_LENGTH};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};

/// Maximum number of data proxies a single reveal may reference.
const MAX_PROXIES: usize = 1_024;

/// Result of one participant's execution of a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevealBody {
    pub dr_id: RequestId,
    pub dr_block_height: u64,
    pub exit_code: u8,
    /// Gas the participant reports having used.
    pub gas_used: u64,
    pub reveal: Vec<u8>,
    /// Hex-encoded public keys of the data proxies consulted, in order.
    pub proxy_pub_keys: Vec<String>,
}

impl RevealBody {
    /// Hash of the reveal body.
    pub fn hash(&self) -> [u8; DIGEST_LENGTH] {
        let proxies: Vec<[u8; DIGEST_LENGTH]> = self
            .proxy_pub_keys
            .iter()
            .map(|key| hash(&[key.as_bytes()]))
            .collect();
        let proxy_parts: Vec<&[u8]> = proxies.iter().map(|digest| digest.as_slice()).collect();
        hash(&[
            self.dr_id.as_ref(),
            &self.dr_block_height.to_be_bytes(),
            &[self.exit_code],
            &self.gas_used.to_be_bytes(),
            &hash(&[self.reveal.as_slice()]),
            &hash(&proxy_parts),
        ])
    }

    /// Commitment a participant must submit before revealing this body.
    ///
    /// Binds the body to the revealing identity, its proof, and the captured
    /// execution output.
    pub fn commitment(
        &self,
        identity: &Identity,
        proof: &[u8],
        stderr: &[String],
        stdout: &[String],
    ) -> Commitment {
        let stderr = stderr.concat();
        let stdout = stdout.concat();
        Commitment::new(hash(&[
            b"reveal_message".as_slice(),
            &self.hash(),
            identity.to_hex().as_bytes(),
            proof,
            stderr.as_bytes(),
            stdout.as_bytes(),
        ]))
    }
}

/// A reveal body paired with the identity that revealed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reveal {
    pub executor: Identity,
    pub body: RevealBody,
}

impl HashSortable for Reveal {
    fn sort_key(&self) -> &[u8] {
        self.executor.as_ref()
    }
}

impl Write for RevealBody {
    fn write(&self, buf: &mut impl BufMut) {
        self.dr_id.write(buf);
        self.dr_block_height.write(buf);
        self.exit_code.write(buf);
        self.gas_used.write(buf);
        wire::write_bytes(&self.reveal, buf);
        wire::write_strs(&self.proxy_pub_keys, buf);
    }
}

impl Read for RevealBody {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            dr_id: RequestId::read(buf)?,
            dr_block_height: u64::read(buf)?,
            exit_code: u8::read(buf)?,
            gas_used: u64::read(buf)?,
            reveal: wire::read_bytes(buf, wire::MAX_FIELD_LENGTH)?,
            proxy_pub_keys: wire::read_strs(buf, MAX_PROXIES)?,
        })
    }
}

impl EncodeSize for RevealBody {
    fn encode_size(&self) -> usize {
        self.dr_id.encode_size()
            + 8
            + 1
            + 8
            + wire::bytes_size(&self.reveal)
            + wire::strs_size(&self.proxy_pub_keys)
    }
}
