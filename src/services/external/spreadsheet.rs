// Google Sheets source. Two strategies: the structured values API when
// an API key is configured, otherwise the public CSV export endpoint.
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Instant;

use crate::error::FederationError;
use crate::models::{QueryResult, SpreadsheetConnectionConfig, TestOutcome};
use crate::services::external::http_api::safe_url;
use crate::services::external::tabular;

const VALUES_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const EXPORT_BASE: &str = "https://docs.google.com/spreadsheets/d";

pub struct SpreadsheetSourceAdapter {
    client: Client,
}

impl SpreadsheetSourceAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch(
        &self,
        config: &SpreadsheetConnectionConfig,
    ) -> Result<QueryResult, FederationError> {
        let start = Instant::now();
        let rows = if config.api_key.is_some() {
            self.fetch_values_api(config).await?
        } else {
            self.fetch_csv_export(config).await?
        };

        tracing::debug!(
            spreadsheet_id = %config.spreadsheet_id,
            rows = rows.len(),
            "fetched spreadsheet source"
        );
        Ok(tabular::table_from_rows(
            rows,
            start.elapsed().as_millis() as u64,
        ))
    }

    pub async fn test(&self, config: &SpreadsheetConnectionConfig) -> TestOutcome {
        match self.fetch(config).await {
            Ok(result) => TestOutcome::ok(format!("fetched {} rows", result.row_count)),
            Err(e) => TestOutcome::failed(e.to_string()),
        }
    }

    async fn fetch_values_api(
        &self,
        config: &SpreadsheetConnectionConfig,
    ) -> Result<Vec<Value>, FederationError> {
        let url = values_url(config);
        let target = safe_url(&url);

        let response = self.client.get(&url).send().await.map_err(|_| {
            FederationError::Connectivity(format!("request to {} failed", target))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FederationError::Execution(format!(
                "spreadsheet request to {} returned status {}",
                target, status
            )));
        }

        let body: Value = response.json().await.map_err(|_| {
            FederationError::Execution(format!("malformed response from {}", target))
        })?;

        match body.get("values") {
            Some(Value::Array(values)) => Ok(rows_from_values(values)),
            _ => Ok(Vec::new()),
        }
    }

    async fn fetch_csv_export(
        &self,
        config: &SpreadsheetConnectionConfig,
    ) -> Result<Vec<Value>, FederationError> {
        let url = export_url(config);
        let target = safe_url(&url);

        let response = self.client.get(&url).send().await.map_err(|_| {
            FederationError::Connectivity(format!("request to {} failed", target))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|_| {
            FederationError::Connectivity(format!("failed to read response from {}", target))
        })?;

        // Access-denied pages come back as HTML, often with a 200.
        if looks_like_html(&text) {
            return Err(FederationError::Execution(
                "spreadsheet is not public; share it or configure an API key".to_string(),
            ));
        }

        if !status.is_success() {
            return Err(FederationError::Execution(format!(
                "spreadsheet request to {} returned status {}",
                target, status
            )));
        }

        Ok(tabular::csv_to_rows(&text))
    }
}

/// Values-API URL: `<base>/<id>/values/<range>?key=<api_key>`. The range
/// expression combines sheet name and A1 range when both are present.
fn values_url(config: &SpreadsheetConnectionConfig) -> String {
    let range = match (config.sheet_name.as_deref(), config.range.as_deref()) {
        (Some(sheet), Some(range)) => format!("{}!{}", sheet, range),
        (Some(sheet), None) => sheet.to_string(),
        (None, Some(range)) => range.to_string(),
        (None, None) => "A:ZZ".to_string(),
    };
    format!(
        "{}/{}/values/{}?key={}",
        VALUES_API_BASE,
        config.spreadsheet_id,
        range,
        config.api_key.as_deref().unwrap_or_default()
    )
}

/// Public CSV export URL; `gid` selects the tab when present.
fn export_url(config: &SpreadsheetConnectionConfig) -> String {
    let mut url = format!(
        "{}/{}/export?format=csv",
        EXPORT_BASE, config.spreadsheet_id
    );
    if let Some(gid) = &config.gid {
        url.push_str("&gid=");
        url.push_str(gid);
    }
    url
}

/// First row is the header row; remaining rows become objects keyed by
/// it. Short rows pad with empty strings, long rows drop the overflow.
fn rows_from_values(values: &[Value]) -> Vec<Value> {
    let mut iter = values.iter();
    let headers: Vec<String> = match iter.next() {
        Some(Value::Array(cells)) => cells
            .iter()
            .map(|cell| cell.as_str().map(str::to_string).unwrap_or_else(|| cell.to_string()))
            .collect(),
        _ => return Vec::new(),
    };

    iter.filter_map(|row| row.as_array())
        .map(|cells| {
            let mut obj = Map::new();
            for (idx, header) in headers.iter().enumerate() {
                let cell = cells.get(idx).cloned().unwrap_or(Value::String(String::new()));
                obj.insert(header.clone(), cell);
            }
            Value::Object(obj)
        })
        .collect()
}

fn looks_like_html(text: &str) -> bool {
    text.trim_start().starts_with('<')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> SpreadsheetConnectionConfig {
        SpreadsheetConnectionConfig {
            spreadsheet_id: "sheet-1".to_string(),
            sheet_name: None,
            gid: None,
            range: None,
            api_key: None,
        }
    }

    #[test]
    fn test_values_url_combines_sheet_and_range() {
        let mut cfg = config();
        cfg.sheet_name = Some("Orders".to_string());
        cfg.range = Some("A1:C10".to_string());
        cfg.api_key = Some("k".to_string());
        assert_eq!(
            values_url(&cfg),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-1/values/Orders!A1:C10?key=k"
        );
    }

    #[test]
    fn test_values_url_defaults_range() {
        let mut cfg = config();
        cfg.api_key = Some("k".to_string());
        assert!(values_url(&cfg).contains("/values/A:ZZ?"));
    }

    #[test]
    fn test_export_url_with_gid() {
        let mut cfg = config();
        cfg.gid = Some("42".to_string());
        assert_eq!(
            export_url(&cfg),
            "https://docs.google.com/spreadsheets/d/sheet-1/export?format=csv&gid=42"
        );
    }

    #[test]
    fn test_rows_from_values_headers_first() {
        let values = vec![
            json!(["name", "total"]),
            json!(["Ada", "10"]),
            json!(["Grace"]),
        ];
        let rows = rows_from_values(&values);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({"name": "Ada", "total": "10"}));
        assert_eq!(rows[1], json!({"name": "Grace", "total": ""}));
    }

    #[test]
    fn test_rows_from_values_empty() {
        assert!(rows_from_values(&[]).is_empty());
    }

    #[test]
    fn test_html_detection() {
        assert!(looks_like_html("<!DOCTYPE html><html>denied</html>"));
        assert!(looks_like_html("  <html>"));
        assert!(!looks_like_html("a,b\n1,2\n"));
    }
}
