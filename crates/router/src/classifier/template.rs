//! `{group}` placeholder templates over regex captures

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use strata_common::errors::{AppError, Result};
use strata_common::identifier::is_valid_identifier;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Group(String),
}

/// A string with `{group}` placeholders, checked against the pattern's capture groups
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Template {
    parts: Vec<Part>,
}

fn config_error(rule: &str, message: String) -> AppError {
    AppError::Configuration {
        message: format!("rule '{}': {}", rule, message),
    }
}

/// Named capture groups of a compiled pattern
pub(crate) fn group_names(regex: &Regex) -> HashSet<String> {
    regex.capture_names().flatten().map(str::to_string).collect()
}

pub(crate) fn compile_pattern(rule: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| config_error(rule, format!("invalid pattern: {}", e)))
}

impl Template {
    pub(crate) fn parse(rule: &str, raw: &str, groups: &HashSet<String>) -> Result<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| config_error(rule, format!("unclosed placeholder in '{}'", raw)))?;
            let group = &after[..close];
            if !is_valid_identifier(group) || !groups.contains(group) {
                return Err(config_error(
                    rule,
                    format!("placeholder '{{{}}}' is not a capture group of the pattern", group),
                ));
            }
            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Part::Group(group.to_string()));
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self { parts })
    }

    /// Substitute captures; groups that did not participate render empty. Result is trimmed.
    pub(crate) fn render(&self, captures: &Captures<'_>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Group(name) => {
                    if let Some(m) = captures.name(name) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
        out.trim().to_string()
    }
}

/// Property value: string values are templates, other scalars are copied
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PropertyTemplate {
    Text(Template),
    Fixed(Value),
}

pub(crate) fn parse_properties(
    rule: &str,
    properties: &BTreeMap<String, Value>,
    groups: &HashSet<String>,
) -> Result<Vec<(String, PropertyTemplate)>> {
    strata_common::models::validate_properties(properties)?;
    properties
        .iter()
        .map(|(key, value)| -> Result<(String, PropertyTemplate)> {
            let template = match value {
                Value::String(raw) => PropertyTemplate::Text(Template::parse(rule, raw, groups)?),
                other => PropertyTemplate::Fixed(other.clone()),
            };
            Ok((key.clone(), template))
        })
        .collect()
}

pub(crate) fn render_properties(
    properties: &[(String, PropertyTemplate)],
    captures: &Captures<'_>,
) -> BTreeMap<String, Value> {
    properties
        .iter()
        .map(|(key, template)| {
            let value = match template {
                PropertyTemplate::Text(t) => Value::String(t.render(captures)),
                PropertyTemplate::Fixed(v) => v.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}
