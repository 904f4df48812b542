use crate::extract::extract;
use oracle_primitives::Reveal;
use serde_json_path::JsonPath;

/// Mark every reveal not holding the most frequent value as an outlier.
///
/// Consensus requires the most frequent value to be held by at least two
/// thirds of the replication factor.
pub(crate) fn detect_outliers(
    reveals: &[Reveal],
    path: &JsonPath,
    replication_factor: u16,
    errors: &mut [bool],
) -> (Vec<bool>, bool) {
    let extracted = extract(reveals, path, errors);
    let outliers = extracted
        .values
        .iter()
        .map(|value| extracted.frequency(value.as_ref()) != extracted.max_frequency)
        .collect();
    let consensus = extracted.max_frequency * 3 >= replication_factor as usize * 2;
    (outliers, consensus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::compile;
    use oracle_primitives::{Identity, RevealBody};
    use test_case::test_case;

    fn reveals(payloads: &[(u8, &str)]) -> Vec<Reveal> {
        payloads
            .iter()
            .enumerate()
            .map(|(i, (exit_code, payload))| Reveal {
                executor: Identity::new(vec![i as u8]),
                body: RevealBody {
                    exit_code: *exit_code,
                    reveal: payload.as_bytes().to_vec(),
                    ..Default::default()
                },
            })
            .collect()
    }

    #[test_case(
        &[(0, r#"{"a":"x"}"#), (0, r#"{"a":"x"}"#), (0, r#"{"a":"y"}"#)],
        3, &[false, false, true], true;
        "two of three"
    )]
    #[test_case(
        &[(0, r#"{"a":"x"}"#), (0, r#"{"a":"y"}"#), (0, r#"{"a":"z"}"#)],
        3, &[false, false, false], false;
        "all distinct"
    )]
    #[test_case(
        &[(0, r#"{"a":1}"#), (1, r#"{"a":1}"#), (0, r#"{"a":1}"#), (0, r#"{"b":1}"#)],
        4, &[false, true, false, true], false;
        "errors are outliers"
    )]
    #[test_case(
        &[(1, ""), (2, "")],
        2, &[false, false], false;
        "nothing extracted"
    )]
    fn test_mode(payloads: &[(u8, &str)], rf: u16, expected: &[bool], consensus: bool) {
        let reveals = reveals(payloads);
        let path = compile(b"$.a").unwrap();
        let mut errors = vec![false; reveals.len()];
        let (outliers, reached) = detect_outliers(&reveals, &path, rf, &mut errors);
        assert_eq!(outliers, expected);
        assert_eq!(reached, consensus);
    }
}
