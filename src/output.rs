//! Output types: records, result sets, and per-request statistics.

use crate::error::ExtractError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One extracted entity: field name → value as the model produced it.
///
/// Keys are always lowercase. Every way of building a record, including
/// deserialisation, goes through [`ExtractionRecord::from_object`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractionRecord(Map<String, Value>);

impl<'de> Deserialize<'de> for ExtractionRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_object)
    }
}

impl ExtractionRecord {
    /// Build a record from a JSON object, lowercasing every key.
    ///
    /// When two keys collide after lowercasing (`"Name"` and `"name"`), the
    /// value visited last wins. The entry keeps the position of the first one.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let mut fields = Map::with_capacity(object.len());
        for (key, value) in object {
            fields.insert(key.to_lowercase(), value);
        }
        Self(fields)
    }

    /// Look up a field. `key` is matched case-insensitively.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(v) => Some(v),
            None => self.0.get(&key.to_lowercase()),
        }
    }

    /// Field names in emission order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// The ordered records produced from one document + question pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    records: Vec<ExtractionRecord>,
}

impl ExtractionResult {
    pub fn new(records: Vec<ExtractionRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtractionRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<ExtractionRecord> {
        self.records
    }

    /// Union of field names over every record, in first-seen order.
    ///
    /// Records need not share a key set; a column appears as soon as any
    /// record mentions it.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut columns = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if seen.insert(key) {
                    columns.push(key.to_string());
                }
            }
        }
        columns
    }

    /// The records, or [`ExtractError::NoRecords`] when there are none.
    ///
    /// For callers that need at least one row to lay out a table or infer
    /// columns.
    pub fn require_rows(&self) -> Result<&[ExtractionRecord], ExtractError> {
        if self.records.is_empty() {
            Err(ExtractError::NoRecords)
        } else {
            Ok(&self.records)
        }
    }
}

impl<'a> IntoIterator for &'a ExtractionResult {
    type Item = &'a ExtractionRecord;
    type IntoIter = std::slice::Iter<'a, ExtractionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Identity of the document that was queried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub size_bytes: usize,
    /// Files API id when the document was uploaded rather than inlined.
    pub file_id: Option<String>,
}

/// Accounting for one extraction request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Attempts made for the messages call, including the first.
    pub attempts: u32,
    pub upload_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Why the model stopped (`end_turn`, `max_tokens`, …) if reported.
    pub stop_reason: Option<String>,
}

/// Everything one extraction produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub records: ExtractionResult,
    pub question: String,
    /// The model's reply before any cleanup.
    pub raw_text: String,
    pub document: DocumentInfo,
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> ExtractionRecord {
        match v {
            Value::Object(map) => ExtractionRecord::from_object(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn from_object_lowercases_keys() {
        let r = record(json!({"PO Number": "PO-1", "Qty": 3}));
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["po number", "qty"]);
        assert_eq!(r.get("QTY"), Some(&json!(3)));
    }

    #[test]
    fn colliding_keys_last_wins() {
        let mut map = Map::new();
        map.insert("Name".into(), json!("first"));
        map.insert("name".into(), json!("second"));
        let r = ExtractionRecord::from_object(map);
        assert_eq!(r.len(), 1);
        assert_eq!(r.get("name"), Some(&json!("second")));
    }

    #[test]
    fn columns_are_union_in_first_seen_order() {
        let result = ExtractionResult::new(vec![
            record(json!({"style": "A1", "qty": 10})),
            record(json!({"qty": 5, "colour": "navy"})),
            record(json!({"price": 1.5})),
        ]);
        assert_eq!(result.columns(), vec!["style", "qty", "colour", "price"]);
    }

    #[test]
    fn require_rows_on_empty_result() {
        let empty = ExtractionResult::default();
        assert!(matches!(empty.require_rows(), Err(ExtractError::NoRecords)));

        let one = ExtractionResult::new(vec![record(json!({"a": 1}))]);
        assert_eq!(one.require_rows().unwrap().len(), 1);
    }

    #[test]
    fn result_serialises_as_plain_array() {
        let result = ExtractionResult::new(vec![record(json!({"Name": "A", "Qty": 1}))]);
        let s = serde_json::to_string(&result).unwrap();
        assert_eq!(s, r#"[{"name":"A","qty":1}]"#);
    }

    #[test]
    fn deserialising_lowercases_keys() {
        let result: ExtractionResult =
            serde_json::from_str(r#"[{"PO Number": "PO-1", "Name": "x", "name": "y"}]"#).unwrap();
        let r = &result.records()[0];
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["po number", "name"]);
        assert_eq!(r.get("name"), Some(&json!("y")));
    }
}
