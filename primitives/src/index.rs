use crate::{wire, RequestId, DIGEST_LENGTH};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use commonware_utils::hex;
use std::fmt::{self, Debug, Display, Formatter};

const PRICE_LENGTH: usize = 16;
const HEIGHT_LENGTH: usize = 8;

/// Sort key of a data request within its status.
///
/// ```text
/// +-------------------------+-------------------------+-------------+
/// | posted gas price (u128) | u64::MAX - height (u64) | id (32)     |
/// +-------------------------+-------------------------+-------------+
/// ```
///
/// All fields are big-endian, so comparing two indices byte-wise compares
/// gas price first, then height (inverted so that earlier heights sort
/// higher), then id. Iterating an ordered collection of indices in descending
/// order therefore yields the highest fee first, then the earliest arrival,
/// then the highest id.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRequestIndex([u8; DataRequestIndex::LENGTH]);

impl DataRequestIndex {
    /// Encoded length in bytes.
    pub const LENGTH: usize = PRICE_LENGTH + HEIGHT_LENGTH + DIGEST_LENGTH;

    /// Build the index of a request.
    pub fn new(posted_gas_price: u128, height: u64, id: &RequestId) -> Self {
        let mut raw = [0u8; Self::LENGTH];
        raw[..PRICE_LENGTH].copy_from_slice(&posted_gas_price.to_be_bytes());
        raw[PRICE_LENGTH..PRICE_LENGTH + HEIGHT_LENGTH]
            .copy_from_slice(&(u64::MAX - height).to_be_bytes());
        raw[PRICE_LENGTH + HEIGHT_LENGTH..].copy_from_slice(id.as_ref());
        Self(raw)
    }

    /// Gas price component.
    pub fn gas_price(&self) -> u128 {
        let mut price = [0u8; PRICE_LENGTH];
        price.copy_from_slice(&self.0[..PRICE_LENGTH]);
        u128::from_be_bytes(price)
    }

    /// Posting height component.
    pub fn height(&self) -> u64 {
        let mut height = [0u8; HEIGHT_LENGTH];
        height.copy_from_slice(&self.0[PRICE_LENGTH..PRICE_LENGTH + HEIGHT_LENGTH]);
        u64::MAX - u64::from_be_bytes(height)
    }

    /// Request id component.
    pub fn id(&self) -> RequestId {
        let mut id = [0u8; DIGEST_LENGTH];
        id.copy_from_slice(&self.0[PRICE_LENGTH + HEIGHT_LENGTH..]);
        RequestId::new(id)
    }
}

impl AsRef<[u8]> for DataRequestIndex {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for DataRequestIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{}]",
            self.gas_price(),
            self.height(),
            hex(self.id().as_ref())
        )
    }
}

impl Debug for DataRequestIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Write for DataRequestIndex {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }
}

impl Read for DataRequestIndex {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self(wire::read_array(buf)?))
    }
}

impl EncodeSize for DataRequestIndex {
    fn encode_size(&self) -> usize {
        Self::LENGTH
    }
}
