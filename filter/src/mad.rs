//! Median absolute deviation over arbitrary-precision integers.

use crate::{Error, SigmaMultiplier};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::str::FromStr;

/// Integer range revealed values must fall in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberType {
    I32,
    U32,
    I64,
    U64,
    I128,
    U128,
    I256,
    U256,
}

impl NumberType {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        Ok(match byte {
            0x00 => Self::I32,
            0x01 => Self::U32,
            0x02 => Self::I64,
            0x03 => Self::U64,
            0x04 => Self::I128,
            0x05 => Self::U128,
            0x06 => Self::I256,
            0x07 => Self::U256,
            other => return Err(Error::InvalidNumberType(other)),
        })
    }

    fn bits(&self) -> usize {
        match self {
            Self::I32 | Self::U32 => 32,
            Self::I64 | Self::U64 => 64,
            Self::I128 | Self::U128 => 128,
            Self::I256 | Self::U256 => 256,
        }
    }

    fn signed(&self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::I128 | Self::I256)
    }

    /// Inclusive `(min, max)` bounds of the type.
    pub fn bounds(&self) -> (BigInt, BigInt) {
        let one = BigInt::one();
        if self.signed() {
            let half = &one << (self.bits() - 1);
            (-half.clone(), half - one)
        } else {
            (BigInt::zero(), (&one << self.bits()) - one)
        }
    }

    /// Parse a decimal integer, rejecting values outside the type's range.
    pub fn parse(&self, text: &str) -> Option<BigInt> {
        if text.is_empty() || text.contains('_') {
            return None;
        }
        let value = BigInt::from_str(text).ok()?;
        let (min, max) = self.bounds();
        (value >= min && value <= max).then_some(value)
    }
}

/// Median of a sorted list, averaging the middle pair of an even-length list.
fn median(sorted: &[BigRational]) -> BigRational {
    let n = sorted.len();
    if n % 2 == 0 {
        (&sorted[n / 2 - 1] + &sorted[n / 2]) / BigRational::from_integer(BigInt::from(2))
    } else {
        sorted[n / 2].clone()
    }
}

/// Mark as outliers the values deviating from the median by more than
/// `sigma * MAD`.
///
/// Missing, unparseable, or out-of-range values are flagged in `errors` and
/// are always outliers. Consensus requires at least two thirds of the
/// replication factor to be within range of the median.
pub(crate) fn detect_outliers(
    values: &[Option<String>],
    sigma: SigmaMultiplier,
    number_type: NumberType,
    replication_factor: u16,
    errors: &mut [bool],
) -> (Vec<bool>, bool) {
    let parsed: Vec<Option<BigRational>> = values
        .iter()
        .map(|value| {
            value
                .as_deref()
                .and_then(|text| number_type.parse(text))
                .map(BigRational::from_integer)
        })
        .collect();
    for (position, value) in parsed.iter().enumerate() {
        if value.is_none() {
            errors[position] = true;
        }
    }

    let mut sorted: Vec<BigRational> = parsed.iter().flatten().cloned().collect();
    if sorted.is_empty() {
        return (vec![false; values.len()], false);
    }
    sorted.sort();
    let center = median(&sorted);
    let mut deviations: Vec<BigRational> = sorted
        .iter()
        .map(|value| (value - &center).abs())
        .collect();
    deviations.sort();
    let max_deviation = sigma.to_ratio() * median(&deviations);

    let outliers: Vec<bool> = parsed
        .iter()
        .map(|value| match value {
            Some(value) => (value - &center).abs() > max_deviation,
            None => true,
        })
        .collect();
    let within = outliers.iter().filter(|outlier| !**outlier).count();
    (outliers, within * 3 >= replication_factor as usize * 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn values(raw: &[&str]) -> Vec<Option<String>> {
        raw.iter()
            .map(|value| (!value.is_empty()).then(|| value.to_string()))
            .collect()
    }

    #[test]
    fn test_reference_example() {
        // median 6.5, MAD 1.5
        let values = values(&["4", "5", "6", "7", "8", "9"]);
        let mut errors = vec![false; 6];
        let (outliers, consensus) = detect_outliers(
            &values,
            SigmaMultiplier::new(1_000_000),
            NumberType::I32,
            6,
            &mut errors,
        );
        assert_eq!(outliers, vec![true, false, false, true, false, false]);
        assert!(consensus);
        assert!(errors.iter().all(|error| !error));
    }

    #[test_case(&["4", "5", "6", "7", "8", "9"], 1_500_000, &[false; 6]; "wider sigma keeps everything")]
    #[test_case(&["10", "10", "10", "11"], 1_000_000, &[false, false, false, true]; "zero MAD")]
    #[test_case(&["-5", "-6", "-7"], 0, &[true, false, true]; "negative values")]
    #[test_case(&["1", "", "2", "x"], 1_000_000, &[false, true, false, true]; "errors are outliers")]
    fn test_outliers(raw: &[&str], sigma: u64, expected: &[bool]) {
        let values = values(raw);
        let mut errors = vec![false; values.len()];
        let (outliers, _) = detect_outliers(
            &values,
            SigmaMultiplier::new(sigma),
            NumberType::I64,
            values.len() as u16,
            &mut errors,
        );
        assert_eq!(outliers, expected);
    }

    #[test]
    fn test_no_valid_values() {
        let values = values(&["", "\"3\"", "1.5"]);
        let mut errors = vec![false; 3];
        let (outliers, consensus) = detect_outliers(
            &values,
            SigmaMultiplier::new(1_000_000),
            NumberType::U64,
            3,
            &mut errors,
        );
        assert_eq!(outliers, vec![false; 3]);
        assert!(!consensus);
        assert_eq!(errors, vec![true; 3]);
    }

    #[test_case(NumberType::I32, "2147483647", true; "i32 max")]
    #[test_case(NumberType::I32, "2147483648", false; "i32 overflow")]
    #[test_case(NumberType::I32, "-2147483648", true; "i32 min")]
    #[test_case(NumberType::U32, "-1", false; "u32 negative")]
    #[test_case(NumberType::U64, "18446744073709551615", true; "u64 max")]
    #[test_case(NumberType::I128, "-170141183460469231731687303715884105729", false; "i128 underflow")]
    #[test_case(NumberType::U128, "340282366920938463463374607431768211455", true; "u128 max")]
    #[test_case(NumberType::I256, "57896044618658097711785492504343953926634992332820282019728792003956564819968", false; "i256 overflow")]
    #[test_case(NumberType::U256, "115792089237316195423570985008687907853269984665640564039457584007913129639935", true; "u256 max")]
    #[test_case(NumberType::U256, "1_000", false; "separators")]
    fn test_parse_bounds(number_type: NumberType, text: &str, accepted: bool) {
        assert_eq!(number_type.parse(text).is_some(), accepted);
    }

    #[test]
    fn test_number_type_byte() {
        assert_eq!(NumberType::from_byte(0x07), Ok(NumberType::U256));
        assert_eq!(NumberType::from_byte(0x08), Err(Error::InvalidNumberType(8)));
    }

    #[test]
    fn test_consensus_threshold() {
        // 2 of 4 within range, rf 4 requires 3
        let values = values(&["1", "1", "100", "-100"]);
        let mut errors = vec![false; 4];
        let (outliers, consensus) = detect_outliers(
            &values,
            SigmaMultiplier::new(0),
            NumberType::I32,
            4,
            &mut errors,
        );
        assert_eq!(outliers, vec![false, false, true, true]);
        assert!(!consensus);

        // same values, rf 3 requires 2
        let mut errors = vec![false; 4];
        let (_, consensus) = detect_outliers(
            &values,
            SigmaMultiplier::new(0),
            NumberType::I32,
            3,
            &mut errors,
        );
        assert!(consensus);
    }
}
