use crate::{
    extract::{compile, extract},
    mad, mode, Error, FilterCosts, NumberType, SigmaMultiplier, FILTER_TYPE_MAD, FILTER_TYPE_MODE,
    FILTER_TYPE_NONE,
};
use oracle_gas::GasMeter;
use oracle_primitives::Reveal;
use serde_json_path::JsonPath;
use tracing::debug;

/// Minimum input length of a mode filter: type and path length.
const MODE_HEADER_LENGTH: usize = 9;

/// Minimum input length of a MAD filter: type, sigma, number type, and path
/// length.
const MAD_HEADER_LENGTH: usize = 18;

/// A data-level filter decoded from a request's filter input.
///
/// Input layouts (integers big-endian):
///
/// ```text
/// none: | 0x00 |
/// mode: | 0x01 | path_len (u64) | path |
/// mad:  | 0x02 | sigma (u64) | number_type (u8) | path_len (u64) | path |
/// ```
///
/// A path that does not compile is kept as `None`: no value can be read
/// from any reveal, so every reveal errors when the filter is applied.
#[derive(Debug)]
pub enum Filter {
    None,
    Mode {
        path: Option<JsonPath>,
        replication_factor: u16,
    },
    Mad {
        sigma: SigmaMultiplier,
        number_type: NumberType,
        path: Option<JsonPath>,
        replication_factor: u16,
    },
}

impl Filter {
    /// Decode a filter, charging its construction cost to `meter` first.
    pub fn build(
        input: &[u8],
        replication_factor: u16,
        costs: &FilterCosts,
        meter: &mut GasMeter,
    ) -> Result<Self, Error> {
        let Some(kind) = input.first() else {
            return Err(Error::InvalidFilterType);
        };
        let per_replica = |multiplier: u64| multiplier.saturating_mul(replication_factor as u64);
        match *kind {
            FILTER_TYPE_NONE => {
                charge(meter, costs.none)?;
                Ok(Self::None)
            }
            FILTER_TYPE_MODE => {
                charge(meter, per_replica(costs.mode_multiplier))?;
                if input.len() < MODE_HEADER_LENGTH {
                    return Err(Error::FilterInputTooShort(input.len(), MODE_HEADER_LENGTH));
                }
                let path = path(&input[1..MODE_HEADER_LENGTH], &input[MODE_HEADER_LENGTH..])?;
                Ok(Self::Mode {
                    path,
                    replication_factor,
                })
            }
            FILTER_TYPE_MAD => {
                charge(meter, per_replica(costs.mad_multiplier))?;
                if input.len() < MAD_HEADER_LENGTH {
                    return Err(Error::FilterInputTooShort(input.len(), MAD_HEADER_LENGTH));
                }
                let sigma = SigmaMultiplier::from_bytes(&input[1..9])?;
                let number_type = NumberType::from_byte(input[9])?;
                let path = path(&input[10..MAD_HEADER_LENGTH], &input[MAD_HEADER_LENGTH..])?;
                Ok(Self::Mad {
                    sigma,
                    number_type,
                    path,
                    replication_factor,
                })
            }
            _ => Err(Error::InvalidFilterType),
        }
    }

    /// Returns the outlier mask and whether the reveals agree on their data.
    ///
    /// Reveals whose payload cannot be used by the filter are flagged in
    /// `errors`.
    pub fn apply(&self, reveals: &[Reveal], errors: &mut [bool]) -> (Vec<bool>, bool) {
        match self {
            Self::None => (vec![false; reveals.len()], true),
            Self::Mode { path: None, .. } | Self::Mad { path: None, .. } => {
                errors.iter_mut().for_each(|error| *error = true);
                (vec![true; reveals.len()], false)
            }
            Self::Mode {
                path: Some(path),
                replication_factor,
            } => mode::detect_outliers(reveals, path, *replication_factor, errors),
            Self::Mad {
                sigma,
                number_type,
                path: Some(path),
                replication_factor,
            } => {
                let extracted = extract(reveals, path, errors);
                mad::detect_outliers(
                    &extracted.values,
                    *sigma,
                    *number_type,
                    *replication_factor,
                    errors,
                )
            }
        }
    }
}

fn charge(meter: &mut GasMeter, amount: u64) -> Result<(), Error> {
    if meter.consume_tally_gas(amount) {
        return Err(Error::OutOfTallyGas);
    }
    Ok(())
}

fn path(length: &[u8], path: &[u8]) -> Result<Option<JsonPath>, Error> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(length);
    let expected = u64::from_be_bytes(raw);
    if expected != path.len() as u64 {
        return Err(Error::InvalidPathLen {
            expected,
            actual: path.len(),
        });
    }
    match compile(path) {
        Ok(path) => Ok(Some(path)),
        Err(err) => {
            debug!(?err, "filter path selects nothing");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const COSTS: FilterCosts = FilterCosts {
        none: 100,
        mode_multiplier: 10,
        mad_multiplier: 20,
    };

    fn meter(tally_gas: u64) -> GasMeter {
        GasMeter::new(tally_gas, tally_gas, 0, 1, 0)
    }

    fn mode_input(path: &str) -> Vec<u8> {
        let mut input = vec![FILTER_TYPE_MODE];
        input.extend_from_slice(&(path.len() as u64).to_be_bytes());
        input.extend_from_slice(path.as_bytes());
        input
    }

    fn mad_input(sigma: u64, number_type: u8, path: &str) -> Vec<u8> {
        let mut input = vec![FILTER_TYPE_MAD];
        input.extend_from_slice(&sigma.to_be_bytes());
        input.push(number_type);
        input.extend_from_slice(&(path.len() as u64).to_be_bytes());
        input.extend_from_slice(path.as_bytes());
        input
    }

    fn with_extra_byte(mut input: Vec<u8>) -> Vec<u8> {
        input.push(b'b');
        input
    }

    fn without_last_byte(mut input: Vec<u8>) -> Vec<u8> {
        input.pop();
        input
    }

    #[test]
    fn test_build_charges_gas() {
        let mut gas = meter(1_000);
        assert!(matches!(
            Filter::build(&[FILTER_TYPE_NONE], 3, &COSTS, &mut gas),
            Ok(Filter::None)
        ));
        assert_eq!(gas.tally_gas_remaining(), 900);

        assert!(matches!(
            Filter::build(&mode_input("$.a"), 3, &COSTS, &mut gas),
            Ok(Filter::Mode { replication_factor: 3, .. })
        ));
        assert_eq!(gas.tally_gas_remaining(), 870);

        assert!(matches!(
            Filter::build(&mad_input(1_000_000, 0, "$.a"), 3, &COSTS, &mut gas),
            Ok(Filter::Mad { number_type: NumberType::I32, .. })
        ));
        assert_eq!(gas.tally_gas_remaining(), 810);
    }

    #[test]
    fn test_build_out_of_gas() {
        let mut gas = meter(99);
        assert_eq!(
            Filter::build(&[FILTER_TYPE_NONE], 3, &COSTS, &mut gas).unwrap_err(),
            Error::OutOfTallyGas
        );
        assert_eq!(gas.tally_gas_remaining(), 0);
    }

    #[test_case(vec![], Error::InvalidFilterType; "empty")]
    #[test_case(vec![0x03], Error::InvalidFilterType; "unknown type")]
    #[test_case(vec![FILTER_TYPE_MODE, 0, 0], Error::FilterInputTooShort(3, 9); "mode too short")]
    #[test_case(
        with_extra_byte(mode_input("$.a")),
        Error::InvalidPathLen { expected: 3, actual: 4 };
        "mode path length mismatch"
    )]
    #[test_case(vec![FILTER_TYPE_MAD; 17], Error::FilterInputTooShort(17, 18); "mad too short")]
    #[test_case(mad_input(1, 0x08, "$.a"), Error::InvalidNumberType(8); "mad number type")]
    #[test_case(
        without_last_byte(mad_input(1, 0, "$.a")),
        Error::InvalidPathLen { expected: 3, actual: 2 };
        "mad path length mismatch"
    )]
    fn test_build_rejects(input: Vec<u8>, expected: Error) {
        let mut gas = meter(u64::MAX);
        assert_eq!(
            Filter::build(&input, 3, &COSTS, &mut gas).unwrap_err(),
            expected
        );
    }

    #[test_case(mode_input("$.[["); "mode")]
    #[test_case(mad_input(1_000_000, 0, "$.[["); "mad")]
    fn test_malformed_path_errors_every_reveal(input: Vec<u8>) {
        let mut gas = meter(u64::MAX);
        let filter = Filter::build(&input, 3, &COSTS, &mut gas).unwrap();
        assert!(matches!(
            filter,
            Filter::Mode { path: None, .. } | Filter::Mad { path: None, .. }
        ));

        let reveals: Vec<Reveal> = (0..3)
            .map(|i| Reveal {
                executor: oracle_primitives::Identity::new(vec![i]),
                body: oracle_primitives::RevealBody {
                    reveal: br#"{"a":1}"#.to_vec(),
                    ..Default::default()
                },
            })
            .collect();
        let mut errors = vec![false; reveals.len()];
        let (_, consensus) = filter.apply(&reveals, &mut errors);
        assert!(!consensus);
        assert_eq!(errors, vec![true; 3]);
    }
}
