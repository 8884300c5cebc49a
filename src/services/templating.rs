//! SQL templating for virtual datasets.
//!
//! Virtual dataset text may reference `{{ filters.<name> }}` variables and
//! guard them with `{% if filters.<name> %}` blocks. The four `safe_*`
//! filters are the only sanctioned way to interpolate caller-supplied
//! values into query text; each is total and yields nothing for empty or
//! absent input so templates can branch instead of erroring.

use minijinja::value::Value;
use minijinja::{context, Environment, UndefinedBehavior};
use serde::Serialize;

use crate::error::FederationError;
use crate::models::FilterContext;

#[derive(Debug, Clone, Serialize)]
pub struct TemplateValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct FilterTemplateEngine {
    env: Environment<'static>,
}

impl FilterTemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // A missing filter variable renders empty instead of failing the
        // whole query.
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.add_filter("safe_string", safe_string);
        env.add_filter("safe_list", safe_list);
        env.add_filter("safe_number", safe_number);
        env.add_filter("safe_date", safe_date);
        Self { env }
    }

    /// Fast pre-check so plain SQL never goes through the renderer.
    pub fn has_template_variables(sql: &str) -> bool {
        sql.contains("{{") || sql.contains("{%")
    }

    pub fn render(
        &self,
        sql_template: &str,
        filters: &FilterContext,
    ) -> Result<String, FederationError> {
        let template = self
            .env
            .template_from_str(sql_template)
            .map_err(|e| FederationError::Execution(format!("invalid SQL template: {}", e)))?;

        template
            .render(context! { filters => Value::from_serialize(filters) })
            .map_err(|e| FederationError::Execution(format!("template rendering failed: {}", e)))
    }

    /// Names of the `filters.*` variables a template references, for UI
    /// hinting. An uncompilable template yields no names.
    pub fn extract_variable_names(&self, sql: &str) -> Vec<String> {
        let Ok(template) = self.env.template_from_str(sql) else {
            return Vec::new();
        };

        let mut names: Vec<String> = template
            .undeclared_variables(true)
            .into_iter()
            .filter_map(|var| var.strip_prefix("filters.").map(|name| name.to_string()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Compile-only check, no side effects.
    pub fn validate(&self, sql_template: &str) -> TemplateValidation {
        match self.env.template_from_str(sql_template) {
            Ok(_) => TemplateValidation {
                valid: true,
                error: None,
            },
            Err(e) => TemplateValidation {
                valid: false,
                error: Some(e.to_string()),
            },
        }
    }
}

impl Default for FilterTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\'', "''")
}

/// Doubles embedded single quotes; the template supplies the surrounding
/// quotes. Empty or absent input yields nothing.
fn string_escape(value: &Value) -> Option<String> {
    let text = scalar_text(value)?;
    if text.is_empty() {
        return None;
    }
    Some(escape_quotes(&text))
}

/// Drops empty members, quote-escapes and quote-wraps each remaining
/// scalar, and joins with `, ` for direct use inside `IN (...)`.
fn list_escape(value: &Value) -> Option<String> {
    let iter = value.try_iter().ok()?;
    let members: Vec<String> = iter
        .filter_map(|item| {
            let text = scalar_text(&item)?;
            if text.is_empty() {
                return None;
            }
            Some(format!("'{}'", escape_quotes(&text)))
        })
        .collect();

    if members.is_empty() {
        None
    } else {
        Some(members.join(", "))
    }
}

/// Coerces to a numeric literal, or nothing for non-numeric input.
fn number_escape(value: &Value) -> Option<String> {
    if value.is_undefined() || value.is_none() {
        return None;
    }
    if let Some(text) = value.as_str() {
        let trimmed = text.trim();
        if let Ok(int) = trimmed.parse::<i64>() {
            return Some(int.to_string());
        }
        return trimmed.parse::<f64>().ok().map(|f| f.to_string());
    }
    // Already a number; booleans and compound values are not numeric.
    let text = value.to_string();
    if text.parse::<f64>().is_ok() {
        Some(text)
    } else {
        None
    }
}

/// Accepts only strings with a `YYYY-MM-DD` shaped prefix. The check is
/// shape-only: `2024-13-40` passes, `not-a-date` does not.
fn date_escape(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    if !has_date_prefix(text) {
        return None;
    }
    Some(escape_quotes(text))
}

fn has_date_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    bytes[..10].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}

/// Stringify a scalar filter value; compound and absent values yield
/// nothing.
fn scalar_text(value: &Value) -> Option<String> {
    if value.is_undefined() || value.is_none() {
        return None;
    }
    if let Some(s) = value.as_str() {
        return Some(s.to_string());
    }
    if value.try_iter().is_ok() {
        return None;
    }
    Some(value.to_string())
}

fn to_filter_output(result: Option<String>) -> Value {
    // Undefined renders empty and is falsy in {% if %} guards.
    match result {
        Some(text) => Value::from(text),
        None => Value::UNDEFINED,
    }
}

fn safe_string(value: Value) -> Value {
    to_filter_output(string_escape(&value))
}

fn safe_list(value: Value) -> Value {
    to_filter_output(list_escape(&value))
}

fn safe_number(value: Value) -> Value {
    to_filter_output(number_escape(&value))
}

fn safe_date(value: Value) -> Value {
    to_filter_output(date_escape(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(pairs: &[(&str, serde_json::Value)]) -> FilterContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_string_escape_doubles_quotes() {
        assert_eq!(
            string_escape(&Value::from("O'Brien")),
            Some("O''Brien".to_string())
        );
    }

    #[test]
    fn test_string_escape_empty_is_null() {
        assert_eq!(string_escape(&Value::from("")), None);
        assert_eq!(string_escape(&Value::UNDEFINED), None);
    }

    #[test]
    fn test_list_escape_quotes_members() {
        let value = Value::from_serialize(&json!(["a", "b's"]));
        assert_eq!(list_escape(&value), Some("'a', 'b''s'".to_string()));
    }

    #[test]
    fn test_list_escape_empty_is_null() {
        let value = Value::from_serialize(&json!([]));
        assert_eq!(list_escape(&value), None);

        let nullish = Value::from_serialize(&json!(["", null]));
        assert_eq!(list_escape(&nullish), None);
    }

    #[test]
    fn test_number_escape_coerces() {
        assert_eq!(number_escape(&Value::from("42")), Some("42".to_string()));
        assert_eq!(number_escape(&Value::from(12.5)), Some("12.5".to_string()));
        assert_eq!(number_escape(&Value::from("abc")), None);
    }

    #[test]
    fn test_date_escape_is_shape_only() {
        // The prefix check does not validate the calendar, so month 13
        // passes through.
        assert_eq!(
            date_escape(&Value::from("2024-13-40")),
            Some("2024-13-40".to_string())
        );
        assert_eq!(date_escape(&Value::from("not-a-date")), None);
        assert_eq!(
            date_escape(&Value::from("2024-01-15T10:00:00")),
            Some("2024-01-15T10:00:00".to_string())
        );
    }

    #[test]
    fn test_render_substitutes_filter() {
        let engine = FilterTemplateEngine::new();
        let sql = engine
            .render(
                "SELECT * FROM orders WHERE status = '{{ filters.status | safe_string }}'",
                &filters(&[("status", json!("shipped"))]),
            )
            .unwrap();
        assert_eq!(sql, "SELECT * FROM orders WHERE status = 'shipped'");
    }

    #[test]
    fn test_render_missing_variable_is_empty() {
        let engine = FilterTemplateEngine::new();
        let sql = engine
            .render("SELECT {{ filters.x }} FROM t", &FilterContext::new())
            .unwrap();
        assert_eq!(sql, "SELECT  FROM t");
    }

    #[test]
    fn test_render_conditional_guard() {
        let engine = FilterTemplateEngine::new();
        let template =
            "SELECT * FROM orders{% if filters.status %} WHERE status = '{{ filters.status | safe_string }}'{% endif %}";

        let with_filter = engine
            .render(template, &filters(&[("status", json!("open"))]))
            .unwrap();
        assert_eq!(with_filter, "SELECT * FROM orders WHERE status = 'open'");

        let without_filter = engine.render(template, &FilterContext::new()).unwrap();
        assert_eq!(without_filter, "SELECT * FROM orders");
    }

    #[test]
    fn test_render_list_filter_in_clause() {
        let engine = FilterTemplateEngine::new();
        let sql = engine
            .render(
                "SELECT * FROM t WHERE region IN ({{ filters.regions | safe_list }})",
                &filters(&[("regions", json!(["us", "eu"]))]),
            )
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE region IN ('us', 'eu')");
    }

    #[test]
    fn test_has_template_variables() {
        assert!(FilterTemplateEngine::has_template_variables(
            "SELECT {{ filters.a }}"
        ));
        assert!(FilterTemplateEngine::has_template_variables(
            "{% if filters.a %}x{% endif %}"
        ));
        assert!(!FilterTemplateEngine::has_template_variables(
            "SELECT * FROM orders"
        ));
    }

    #[test]
    fn test_extract_variable_names() {
        let engine = FilterTemplateEngine::new();
        let names = engine.extract_variable_names(
            "SELECT * FROM t WHERE a = {{ filters.alpha | safe_number }} \
             {% if filters.beta %}AND b = '{{ filters.beta | safe_string }}'{% endif %}",
        );
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_validate_reports_syntax_errors() {
        let engine = FilterTemplateEngine::new();
        assert!(engine.validate("SELECT {{ filters.a }}").valid);

        let invalid = engine.validate("SELECT {% if filters.a %}x");
        assert!(!invalid.valid);
        assert!(invalid.error.is_some());
    }
}
