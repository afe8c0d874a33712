//! JSON output contracts: extraction from agent text and schema validation.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use jsonschema::{Draft, Validator};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::types::CardSpecifications;

pub const RESEARCH_ASSESSMENT_SCHEMA: &str =
    include_str!("../../../schemas/research_assessment.schema.json");
pub const GENERATED_TASKS_SCHEMA: &str = include_str!("../../../schemas/generated_tasks.schema.json");
pub const CARD_SPECIFICATIONS_SCHEMA: &str =
    include_str!("../../../schemas/card_specifications.schema.json");
pub const CARD_REPORT_SCHEMA: &str = include_str!("../../../schemas/card_report.schema.json");

/// A compiled JSON Schema (Draft 2020-12) plus its source text.
#[derive(Clone)]
pub struct JsonContract {
    name: &'static str,
    schema: Value,
    validator: Arc<Validator>,
}

impl fmt::Debug for JsonContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonContract")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for JsonContract {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.schema == other.schema
    }
}

impl JsonContract {
    pub fn compile(name: &'static str, raw: &str) -> Result<Self> {
        let schema: Value =
            serde_json::from_str(raw).with_context(|| format!("parse schema {name}"))?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .with_context(|| format!("compile schema {name}"))?;
        Ok(Self {
            name,
            schema,
            validator: Arc::new(validator),
        })
    }

    pub fn research_assessment() -> Self {
        Self::builtin("research_assessment", RESEARCH_ASSESSMENT_SCHEMA)
    }

    pub fn generated_tasks() -> Self {
        Self::builtin("generated_tasks", GENERATED_TASKS_SCHEMA)
    }

    pub fn card_specifications() -> Self {
        Self::builtin("card_specifications", CARD_SPECIFICATIONS_SCHEMA)
    }

    pub fn card_report() -> Self {
        Self::builtin("card_report", CARD_REPORT_SCHEMA)
    }

    fn builtin(name: &'static str, raw: &str) -> Self {
        Self::compile(name, raw).expect("bundled schemas should compile")
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Pretty-printed schema for prompts.
    pub fn schema_text(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_else(|_| self.schema.to_string())
    }

    /// Validation messages, empty when `instance` conforms.
    pub fn violations(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect()
    }
}

/// Pull a JSON document out of an agent's final answer.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or JSON surrounded
/// by prose. The text is never edited beyond slicing.
pub fn extract_json(text: &str) -> Result<Value, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("answer is empty".to_string());
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced) {
            return Ok(value);
        }
    }
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|err| format!("answer is not valid JSON: {err}")),
        _ => Err("answer contains no JSON document".to_string()),
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Extract, validate against `contract`, then deserialize.
pub fn parse_with_contract<T: DeserializeOwned>(contract: &JsonContract, text: &str) -> Result<T> {
    let value = extract_json(text).map_err(anyhow::Error::msg)?;
    let violations = contract.violations(&value);
    if !violations.is_empty() {
        bail!(
            "{} schema validation failed:\n- {}",
            contract.name(),
            violations.join("\n- ")
        );
    }
    serde_json::from_value(value).with_context(|| format!("decode {}", contract.name()))
}

pub fn parse_card_specifications(text: &str) -> Result<CardSpecifications> {
    parse_with_contract(&JsonContract::card_specifications(), text)
}
