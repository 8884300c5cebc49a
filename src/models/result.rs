use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One column of a result: name plus canonical type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// The canonical tabular result every adapter produces.
///
/// `rows` are column-name-keyed JSON objects; `fields` follow the source's
/// column order where the source provides one, else the first row's keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub fields: Vec<FieldSchema>,
    pub row_count: usize,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(rows: Vec<Value>, fields: Vec<FieldSchema>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            fields,
            row_count,
            execution_time_ms,
        }
    }

    /// Field inference for sources without native type metadata: every key
    /// of the first row becomes a `text` field, in key order.
    pub fn infer_text_fields(rows: &[Value]) -> Vec<FieldSchema> {
        match rows.first() {
            Some(Value::Object(map)) => map
                .keys()
                .map(|name| FieldSchema::new(name.clone(), "text"))
                .collect(),
            _ => Vec::new(),
        }
    }
}
