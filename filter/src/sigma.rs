use crate::Error;
use num_bigint::BigInt;
use num_rational::BigRational;
use std::fmt::{self, Display, Formatter};

/// Fixed-point precision of [SigmaMultiplier].
const PRECISION: u64 = 1_000_000;

/// Unsigned fixed-point number whose last six decimal digits are the
/// fractional part (`1_500_000` is 1.5).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SigmaMultiplier(u64);

impl SigmaMultiplier {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Decode a big-endian multiplier. Exactly eight bytes are required.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::InvalidSigmaMultiplier(bytes.len()))?;
        Ok(Self(u64::from_be_bytes(raw)))
    }

    pub fn whole_number(&self) -> u64 {
        self.0 / PRECISION
    }

    /// Fractional part, in millionths.
    pub fn fractional_part(&self) -> u64 {
        self.0 % PRECISION
    }

    /// Exact rational value of the multiplier.
    pub fn to_ratio(&self) -> BigRational {
        BigRational::new(BigInt::from(self.0), BigInt::from(PRECISION))
    }
}

impl Display for SigmaMultiplier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.whole_number(), self.fractional_part())
    }
}
