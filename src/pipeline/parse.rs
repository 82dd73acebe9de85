//! Reply parsing: recover the JSON array of records from free-form model text.
//!
//! Even when asked to "return a JSON array of objects", models wrap the
//! answer in prose ("Here is the result:"), code fences, or a stray `json`
//! language tag. This module strips that noise, isolates the array, and
//! normalises each object's keys to lowercase.
//!
//! ## Locating the payload
//!
//! A single first-`[`-to-last-`]` span breaks as soon as the prose contains a
//! bracket of its own (`"Totals [draft]:"`) or the reply carries a second
//! array. Instead each `[` is tried in turn with a bracket-balance scan that
//! understands JSON string literals and escapes; the first balanced span that
//! is an array of objects wins. Only when no candidate parses does the
//! greedy span (and finally the whole cleaned text) become the payload, so
//! that the error reported is about the most plausible JSON.

use crate::error::ParseError;
use crate::output::{ExtractionRecord, ExtractionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Parse a model reply into records.
///
/// Steps:
/// 1. Strip ```` ```json ````, ```` ``` ```` and the bare word `json` (any case), trim
/// 2. Locate the array payload (see module docs)
/// 3. Parse it as a JSON array of objects
/// 4. Lowercase every key, last value wins on collision
///
/// `"[]"` parses to an empty result; use
/// [`ExtractionResult::require_rows`] when rows are mandatory.
pub fn parse_records(raw: &str) -> Result<ExtractionResult, ParseError> {
    let cleaned = strip_noise(raw);
    let payload = locate_payload(&cleaned);
    debug!(
        "Reply {} bytes → cleaned {} bytes → payload {} bytes",
        raw.len(),
        cleaned.len(),
        payload.len()
    );

    let value: Value = serde_json::from_str(payload).map_err(|e| ParseError::InvalidJson {
        detail: e.to_string(),
    })?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ParseError::NotAnArray {
                found: describe(&other).to_string(),
            })
        }
    };

    let mut objects = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => objects.push(map),
            other => {
                return Err(ParseError::NotAnObject {
                    index,
                    found: describe(&other).to_string(),
                })
            }
        }
    }

    Ok(normalize_keys(objects))
}

/// Lowercase the keys of every object, preserving values and order.
///
/// Idempotent: feeding the maps of an already-normalised result back in
/// yields an equal result.
pub fn normalize_keys(objects: Vec<Map<String, Value>>) -> ExtractionResult {
    ExtractionResult::new(
        objects
            .into_iter()
            .map(ExtractionRecord::from_object)
            .collect(),
    )
}

// ── Step 1: Strip fences and language tags ───────────────────────────────

static RE_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```json|```|\bjson\b").unwrap());

/// Remove code-fence markers and the bare word `json`, then trim.
pub fn strip_noise(text: &str) -> String {
    RE_NOISE.replace_all(text, "").trim().to_string()
}

// ── Step 2: Locate the array payload ─────────────────────────────────────

/// Return the substring of `cleaned` most likely to be the JSON array.
pub fn locate_payload(cleaned: &str) -> &str {
    let mut first_empty: Option<&str> = None;
    let mut known = HashMap::new();

    for (start, _) in cleaned.match_indices('[') {
        let end = match known.get(&start) {
            Some(&end) => end,
            None => balanced_end(cleaned, start, &mut known),
        };
        let Some(end) = end else {
            continue;
        };
        let candidate = &cleaned[start..end];
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Array(items)) if items.iter().all(Value::is_object) => {
                if !items.is_empty() {
                    return candidate;
                }
                if first_empty.is_none() {
                    first_empty = Some(candidate);
                }
            }
            _ => {}
        }
    }

    first_empty
        .or_else(|| greedy_span(cleaned))
        .unwrap_or(cleaned)
}

/// Byte index one past the bracket closing the `[` at `start`.
///
/// Tracks `[`/`]` and `{`/`}` on a stack, skips over string literals
/// (honouring backslash escapes), and gives up on the first mismatched
/// closer. Works on bytes: every delimiter is ASCII, and ASCII bytes never
/// occur inside a multi-byte UTF-8 sequence.
///
/// Every `[` the scan meets outside a string shares its string state from
/// there on, so its outcome is recorded in `known`: its end when it closes,
/// `None` when it is still open at a mismatch or at the end of the text.
/// Later starts reuse those outcomes instead of rescanning, which keeps a
/// reply full of unclosed brackets linear.
fn balanced_end(text: &str, start: usize, known: &mut HashMap<usize, Option<usize>>) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut stack: Vec<(u8, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        let pos = start + offset;
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' => stack.push((b']', pos)),
            b'{' => stack.push((b'}', pos)),
            b']' | b'}' => match stack.pop() {
                Some((closer, open)) if closer == b => {
                    if closer == b']' {
                        known.insert(open, Some(pos + 1));
                    }
                    if stack.is_empty() {
                        return Some(pos + 1);
                    }
                }
                Some(unmatched) => {
                    stack.push(unmatched);
                    break;
                }
                None => break,
            },
            _ => {}
        }
    }

    for (closer, open) in stack {
        if closer == b']' {
            known.insert(open, None);
        }
    }
    None
}

/// First `[` through last `]`, if they appear in that order.
fn greedy_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_json(result: &ExtractionResult) -> Value {
        serde_json::to_value(result).unwrap()
    }

    #[test]
    fn fenced_reply_with_prose() {
        let raw = "Here is the result:\n```json\n[{\"Name\": \"A\", \"Qty\": 1}]\n```";
        let result = parse_records(raw).unwrap();
        assert_eq!(as_json(&result), json!([{"name": "A", "qty": 1}]));
    }

    #[test]
    fn fence_tags_in_any_case() {
        for raw in [
            "```JSON\n[{\"a\": 1}]\n```",
            "```Json\n[{\"a\": 1}]\n```",
            "JSON: [{\"a\": 1}]",
            "[{\"a\": 1}]",
        ] {
            let result = parse_records(raw).unwrap_or_else(|e| panic!("{raw:?}: {e}"));
            assert_eq!(as_json(&result), json!([{"a": 1}]), "input: {raw:?}");
        }
    }

    #[test]
    fn values_pass_through_unchanged() {
        let raw = r#"[{"Id": 7, "Ok": true, "Note": null, "Price": 12.5, "Sizes": ["S", "M"], "Meta": {"K": 1}}]"#;
        let result = parse_records(raw).unwrap();
        let record = &result.records()[0];
        assert_eq!(record.get("id"), Some(&json!(7)));
        assert_eq!(record.get("ok"), Some(&json!(true)));
        assert_eq!(record.get("note"), Some(&Value::Null));
        assert_eq!(record.get("price"), Some(&json!(12.5)));
        assert_eq!(record.get("sizes"), Some(&json!(["S", "M"])));
        // Only top-level keys are normalised.
        assert_eq!(record.get("meta"), Some(&json!({"K": 1})));
    }

    #[test]
    fn no_brackets_is_a_parse_error() {
        let err = parse_records("no data found").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }), "got: {err:?}");
    }

    #[test]
    fn empty_array_is_empty_result() {
        let result = parse_records("[]").unwrap();
        assert!(result.is_empty());
        assert!(result.require_rows().is_err());
    }

    #[test]
    fn object_payload_is_not_an_array() {
        let err = parse_records(r#"{"name": "A"}"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::NotAnArray {
                found: "an object".into()
            }
        );
    }

    #[test]
    fn scalar_elements_are_rejected() {
        let err = parse_records(r#"[{"a": 1}, 2]"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::NotAnObject {
                index: 1,
                found: "a number".into()
            }
        );
    }

    #[test]
    fn colliding_keys_keep_one_entry_last_wins() {
        let result = parse_records(r#"[{"Name": "first", "name": "second"}]"#).unwrap();
        let record = &result.records()[0];
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("name"), Some(&json!("second")));
    }

    #[test]
    fn normalising_twice_is_a_no_op() {
        let once = parse_records(r#"[{"Style": "A1", "QTY": 4}, {"colour": "red"}]"#).unwrap();
        let maps = once.iter().map(|r| r.as_map().clone()).collect();
        let twice = normalize_keys(maps);
        assert_eq!(once, twice);
    }

    #[test]
    fn heterogeneous_records_are_allowed() {
        let result = parse_records(r#"[{"a": 1}, {"b": 2}, {}]"#).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.columns(), vec!["a", "b"]);
    }

    #[test]
    fn bracket_in_prose_before_array() {
        let raw = "Totals [draft] below:\n[{\"po\": \"123\"}]\nLet me know if you need more.";
        let result = parse_records(raw).unwrap();
        assert_eq!(as_json(&result), json!([{"po": "123"}]));
    }

    #[test]
    fn stray_closer_after_array() {
        let raw = "[{\"po\": \"123\"}]\n(see note 2])";
        let result = parse_records(raw).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn first_of_two_arrays_wins() {
        let raw = "Lines:\n[{\"line\": 1}]\nTotals:\n[{\"total\": 9}]";
        let result = parse_records(raw).unwrap();
        assert_eq!(as_json(&result), json!([{"line": 1}]));
    }

    #[test]
    fn footnote_array_is_skipped() {
        let raw = "As shown in [1], the order is:\n[{\"po\": \"A\"}]";
        let result = parse_records(raw).unwrap();
        assert_eq!(as_json(&result), json!([{"po": "A"}]));
    }

    #[test]
    fn brackets_inside_strings_do_not_confuse_the_scan() {
        let raw = r#"[{"note": "see ] and [ and \"quoted\" }"}, {"n": 2}]"#;
        let result = parse_records(raw).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.records()[0].get("note"),
            Some(&json!("see ] and [ and \"quoted\" }"))
        );
    }

    #[test]
    fn nested_arrays_return_outer_array() {
        let raw = r#"[{"sizes": [1, 2, 3]}]"#;
        let result = parse_records(raw).unwrap();
        assert_eq!(result.records()[0].get("sizes"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn truncated_array_reports_invalid_json() {
        let raw = "```json\n[{\"a\": 1}, {\"b\":\n```";
        let err = parse_records(raw).unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }));
    }

    #[test]
    fn word_json_inside_identifiers_survives() {
        let raw = r#"[{"type": "jsonb", "col": "my_json_col"}]"#;
        let result = parse_records(raw).unwrap();
        assert_eq!(result.records()[0].get("type"), Some(&json!("jsonb")));
        assert_eq!(result.records()[0].get("col"), Some(&json!("my_json_col")));
    }

    #[test]
    fn strip_noise_removes_tokens_and_trims() {
        assert_eq!(strip_noise("  ```JSON\n[1]\n```  "), "[1]");
        assert_eq!(strip_noise("json [1]"), "[1]");
    }

    #[test]
    fn locate_payload_falls_back_to_whole_text() {
        assert_eq!(locate_payload("no data found"), "no data found");
    }

    #[test]
    fn locate_payload_falls_back_to_greedy_span() {
        // Balanced but not valid JSON, so the greedy span is returned.
        assert_eq!(locate_payload("x [{\"a\": 1}, ] y"), "[{\"a\": 1}, ]");
    }

    #[test]
    fn balanced_end_rejects_mismatch() {
        let end = |text: &str| balanced_end(text, 0, &mut HashMap::new());
        assert_eq!(end("[}"), None);
        assert_eq!(end("[[]]tail"), Some(4));
        assert_eq!(end("[\"]\"]"), Some(5));
    }

    #[test]
    fn balanced_end_records_inner_outcomes() {
        let mut known = HashMap::new();
        assert_eq!(balanced_end("[[1] [2", 0, &mut known), None);
        assert_eq!(known.get(&0), Some(&None));
        assert_eq!(known.get(&1), Some(&Some(4)));
        assert_eq!(known.get(&5), Some(&None));
    }

    #[test]
    fn bracket_inside_unterminated_string_is_still_tried() {
        // From the first `[` the array sits inside a string that never closes.
        let text = "[ \"x [{\"a\": 1}]";
        assert_eq!(locate_payload(text), "[{\"a\": 1}]");
    }

    #[test]
    fn many_unclosed_brackets_scan_in_linear_time() {
        let text = format!("{}[{{\"a\": 1}}]", "[".repeat(50_000));
        let start = std::time::Instant::now();
        assert_eq!(locate_payload(&text), "[{\"a\": 1}]");
        assert!(
            start.elapsed() < std::time::Duration::from_secs(5),
            "took {:?}",
            start.elapsed()
        );
    }
}
