//! Webhook body templates.
//!
//! Templates are plain strings with `{{placeholder}}` tokens. A template that
//! is a JSON object or array once its placeholders are masked is treated as
//! JSON: substituted values are escaped as JSON string content and the body
//! is sent as `application/json`. Anything else, including text that merely
//! starts with a placeholder, is sent as `text/plain`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use stockwatch_common::types::{Candidate, ConditionKind};

/// Body used when a webhook config has an empty template.
pub const DEFAULT_TEMPLATE: &str =
    r#"{"text": "{{name}}: {{condition}} (stock {{stock}}, {{days_left}} days left)"}"#;

/// Placeholders a template may reference.
pub const PLACEHOLDERS: &[&str] = &[
    "name",
    "stock",
    "days_left",
    "condition",
    "item_id",
    "expiration_date",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{{{0}}}}}'")]
    UnknownPlaceholder(String),

    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
}

/// Values substituted into a template.
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub item_id: Uuid,
    pub name: String,
    pub stock: i32,
    pub days_left: Option<i64>,
    pub condition: ConditionKind,
    pub expiration_date: Option<NaiveDate>,
}

impl From<&Candidate> for TemplateVars {
    fn from(candidate: &Candidate) -> Self {
        Self {
            item_id: candidate.item.id,
            name: candidate.item.name.clone(),
            stock: candidate.item.stock,
            days_left: candidate.days_left,
            condition: candidate.condition,
            expiration_date: candidate.item.expiration_date,
        }
    }
}

impl TemplateVars {
    fn lookup(&self, key: &str) -> Option<String> {
        let value = match key {
            "name" => self.name.clone(),
            "stock" => self.stock.to_string(),
            "days_left" => self.days_left.map(|d| d.to_string()).unwrap_or_default(),
            "condition" => self.condition.to_string(),
            "item_id" => self.item_id.to_string(),
            "expiration_date" => self
                .expiration_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }
}

/// A rendered request body and the content type it should be sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    pub body: String,
    pub content_type: &'static str,
}

/// Render `template` with `vars`. An empty template falls back to
/// [`DEFAULT_TEMPLATE`].
pub fn render(template: &str, vars: &TemplateVars) -> Result<RenderedBody, TemplateError> {
    let template = if template.trim().is_empty() {
        DEFAULT_TEMPLATE
    } else {
        template
    };

    let json = is_json_template(template);
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or(TemplateError::Unterminated(offset + start))?;

        let key = after_open[..end].trim();
        let value = vars
            .lookup(key)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(key.to_string()))?;

        if json {
            out.push_str(&json_escape(&value));
        } else {
            out.push_str(&value);
        }

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);

    Ok(RenderedBody {
        body: out,
        content_type: if json {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        },
    })
}

fn is_json_template(template: &str) -> bool {
    let mut masked = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            return false;
        };
        masked.push_str(&rest[..start]);
        masked.push('0');
        rest = &rest[start + 2 + end + 2..];
    }
    masked.push_str(rest);

    matches!(
        serde_json::from_str::<serde_json::Value>(&masked),
        Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_))
    )
}

/// Escape `value` as the inside of a JSON string literal.
fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
