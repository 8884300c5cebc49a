// Normalization of arbitrary JSON and CSV payloads into the tabular
// result shape. Pure functions, shared by the API and spreadsheet
// adapters.
use serde_json::{Map, Value};

use crate::error::FederationError;
use crate::models::QueryResult;

/// Keys probed, in order, when a JSON object response carries its row
/// array under a conventional wrapper.
const CONVENTIONAL_KEYS: [&str; 6] = ["data", "items", "results", "records", "rows", "entries"];

/// Extract the row array from a decoded JSON response body.
///
/// With a `data_path` the array must live at that dot-path; without one
/// the body itself, a conventional wrapper key, or a single object (as a
/// one-row table) are accepted, in that order.
pub fn json_to_rows(body: Value, data_path: Option<&str>) -> Result<Vec<Value>, FederationError> {
    if let Some(path) = data_path {
        let found = dig(&body, path).ok_or_else(|| {
            FederationError::Execution(format!("no value at data path '{}'", path))
        })?;
        return match found {
            Value::Array(items) => Ok(items.iter().cloned().map(normalize_row).collect()),
            _ => Err(FederationError::Execution(format!(
                "value at data path '{}' is not an array",
                path
            ))),
        };
    }

    match body {
        Value::Array(items) => Ok(items.into_iter().map(normalize_row).collect()),
        Value::Object(map) => {
            for key in CONVENTIONAL_KEYS {
                if let Some(Value::Array(items)) = map.get(key) {
                    return Ok(items.iter().cloned().map(normalize_row).collect());
                }
            }
            // A bare object becomes a one-row table.
            Ok(vec![Value::Object(map)])
        }
        other => Err(FederationError::Execution(format!(
            "response body is not tabular (got {})",
            json_type_name(&other)
        ))),
    }
}

/// Rows must be objects; scalar array members are wrapped under a
/// `value` column so mixed payloads still produce a table.
fn normalize_row(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => {
            let mut obj = Map::new();
            obj.insert("value".to_string(), other);
            Value::Object(obj)
        }
    }
}

/// Walk a `a.b.c` dot-path through nested objects.
fn dig<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse CSV text into rows keyed by the header line. Handles quoted
/// fields, embedded commas and doubled quotes; all cells stay strings.
pub fn csv_to_rows(text: &str) -> Vec<Value> {
    let mut records = parse_csv(text).into_iter();
    let headers = match records.next() {
        Some(headers) if !headers.is_empty() => headers,
        _ => return Vec::new(),
    };

    records
        .filter(|record| !(record.len() == 1 && record[0].is_empty()))
        .map(|record| {
            let mut obj = Map::new();
            for (idx, header) in headers.iter().enumerate() {
                let cell = record.get(idx).cloned().unwrap_or_default();
                obj.insert(header.clone(), Value::String(cell));
            }
            Value::Object(obj)
        })
        .collect()
}

fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

/// Assemble the canonical result from normalized rows: fields are
/// inferred `text` from the first row's keys.
pub fn table_from_rows(rows: Vec<Value>, execution_time_ms: u64) -> QueryResult {
    let fields = QueryResult::infer_text_fields(&rows);
    QueryResult::new(rows, fields, execution_time_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_rows_data_path() {
        let body = json!({"data": {"items": [{"a": 1}]}});
        let rows = json_to_rows(body, Some("data.items")).unwrap();
        assert_eq!(rows, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_json_to_rows_bad_data_path() {
        let body = json!({"data": {"items": [{"a": 1}]}});
        let err = json_to_rows(body, Some("data.rows")).unwrap_err();
        assert!(matches!(err, FederationError::Execution(_)));
    }

    #[test]
    fn test_json_to_rows_conventional_keys() {
        let body = json!({"results": [{"a": 1}, {"a": 2}], "total": 2});
        let rows = json_to_rows(body, None).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_json_to_rows_top_level_array() {
        let rows = json_to_rows(json!([{"a": 1}]), None).unwrap();
        assert_eq!(rows, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_json_to_rows_single_object_becomes_one_row() {
        let rows = json_to_rows(json!({"name": "only"}), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "only");
    }

    #[test]
    fn test_json_to_rows_scalar_members_are_wrapped() {
        let rows = json_to_rows(json!([1, 2]), None).unwrap();
        assert_eq!(rows[0], json!({"value": 1}));
    }

    #[test]
    fn test_json_to_rows_scalar_body_is_rejected() {
        let err = json_to_rows(json!(42), None).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_csv_basic() {
        let rows = csv_to_rows("a,b\n1,2\n3,4\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn test_csv_quoted_fields_and_embedded_commas() {
        let rows = csv_to_rows("name,notes\n\"O'Brien\",\"likes a, b and \"\"c\"\"\"\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "O'Brien");
        assert_eq!(rows[0]["notes"], "likes a, b and \"c\"");
    }

    #[test]
    fn test_csv_crlf_and_missing_cells() {
        let rows = csv_to_rows("a,b\r\n1\r\n");
        assert_eq!(rows[0], json!({"a": "1", "b": ""}));
    }

    #[test]
    fn test_csv_header_only() {
        assert!(csv_to_rows("a,b\n").is_empty());
        assert!(csv_to_rows("").is_empty());
    }

    #[test]
    fn test_table_from_rows_infers_text_fields() {
        let result = table_from_rows(vec![json!({"x": 1, "y": "z"})], 4);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.fields.len(), 2);
        assert!(result.fields.iter().all(|f| f.type_name == "text"));
    }
}
