//! Extraction of comparable values from revealed JSON payloads.

use crate::Error;
use oracle_primitives::Reveal;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::collections::BTreeMap;
use tracing::debug;

/// Compile a JSON path taken from filter input.
///
/// Paths may omit the leading root selector (`result.text` is read as
/// `$.result.text`).
pub(crate) fn compile(raw: &[u8]) -> Result<JsonPath, Error> {
    let raw = std::str::from_utf8(raw).map_err(|err| Error::InvalidJsonPath(err.to_string()))?;
    let normalized = if raw.is_empty() {
        "$".to_string()
    } else if raw.starts_with('$') {
        raw.to_string()
    } else if raw.starts_with('[') {
        format!("${raw}")
    } else {
        format!("$.{raw}")
    };
    JsonPath::parse(&normalized).map_err(|err| Error::InvalidJsonPath(err.to_string()))
}

/// Values extracted from a list of reveals.
#[derive(Debug, Default)]
pub(crate) struct Extracted {
    /// Compact JSON text of each reveal's value, `None` if the reveal errored.
    pub values: Vec<Option<String>>,
    pub frequencies: BTreeMap<String, usize>,
    pub max_frequency: usize,
}

impl Extracted {
    /// Number of reveals holding `value`.
    pub fn frequency(&self, value: Option<&String>) -> usize {
        value
            .and_then(|value| self.frequencies.get(value))
            .copied()
            .unwrap_or(0)
    }
}

/// Extract the value at `path` from every reveal, flagging in `errors` every
/// reveal that exited with a non-zero code, is not valid JSON, or has no
/// value at `path`.
///
/// Numbers keep their literal digits and strings keep their quotes. When a
/// path matches more than one value, the lexicographically smallest wins.
pub(crate) fn extract(reveals: &[Reveal], path: &JsonPath, errors: &mut [bool]) -> Extracted {
    let mut extracted = Extracted {
        values: Vec::with_capacity(reveals.len()),
        ..Default::default()
    };
    for (position, reveal) in reveals.iter().enumerate() {
        let value = value_at(reveal, path);
        if value.is_none() {
            errors[position] = true;
        }
        if let Some(value) = &value {
            let frequency = extracted.frequencies.entry(value.clone()).or_default();
            *frequency += 1;
            extracted.max_frequency = extracted.max_frequency.max(*frequency);
        }
        extracted.values.push(value);
    }
    extracted
}

fn value_at(reveal: &Reveal, path: &JsonPath) -> Option<String> {
    if reveal.body.exit_code != 0 {
        return None;
    }
    let document: Value = match serde_json::from_slice(&reveal.body.reveal) {
        Ok(document) => document,
        Err(err) => {
            debug!(executor = %reveal.executor, ?err, "reveal is not valid JSON");
            return None;
        }
    };
    path.query(&document)
        .all()
        .into_iter()
        .map(|node| node.to_string())
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_primitives::{Identity, RevealBody};
    use test_case::test_case;

    fn reveal(exit_code: u8, payload: &str) -> Reveal {
        Reveal {
            executor: Identity::new(vec![exit_code]),
            body: RevealBody {
                exit_code,
                reveal: payload.as_bytes().to_vec(),
                ..Default::default()
            },
        }
    }

    #[test_case("$.result.text", r#"{"result":{"text":"A"}}"#, Some("\"A\""); "string keeps quotes")]
    #[test_case("result.number", r#"{"result":{"number":123456789012345678901234567890}}"#, Some("123456789012345678901234567890"); "big number keeps digits")]
    #[test_case("[0]", "[7, 8]", Some("7"); "root index")]
    #[test_case("$.prices[*]", r#"{"prices":[30, 100, 4]}"#, Some("100"); "wildcard takes smallest text")]
    #[test_case("$.result.missing", r#"{"result":{}}"#, None; "missing")]
    #[test_case("$.result", "not json", None; "corrupt")]
    fn test_value_at(path: &str, payload: &str, expected: Option<&str>) {
        let path = compile(path.as_bytes()).unwrap();
        assert_eq!(
            value_at(&reveal(0, payload), &path).as_deref(),
            expected
        );
    }

    #[test]
    fn test_invalid_path() {
        assert!(matches!(
            compile(b"$.[["),
            Err(Error::InvalidJsonPath(_))
        ));
        assert!(matches!(
            compile(&[0xff, 0xfe]),
            Err(Error::InvalidJsonPath(_))
        ));
    }

    #[test]
    fn test_extract_flags_errors() {
        let path = compile(b"$.v").unwrap();
        let reveals = [
            reveal(0, r#"{"v":1}"#),
            reveal(1, r#"{"v":1}"#),
            reveal(0, r#"{"v":2}"#),
            reveal(0, r#"{"v":1}"#),
            reveal(0, r#"{"w":1}"#),
        ];
        let mut errors = vec![false; reveals.len()];
        let extracted = extract(&reveals, &path, &mut errors);
        assert_eq!(errors, vec![false, true, false, false, true]);
        assert_eq!(extracted.max_frequency, 2);
        assert_eq!(extracted.frequency(Some(&"1".to_string())), 2);
        assert_eq!(extracted.frequency(None), 0);
        assert_eq!(extracted.values[1], None);
    }
}
