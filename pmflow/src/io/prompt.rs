//! Prompt templates for every agent task.
//!
//! Templates are minijinja with strict undefined behavior: a placeholder the
//! context does not supply is a render error, never an empty string.

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::debug;

const TEMPLATES: &[(&str, &str)] = &[
    ("agent_system", include_str!("prompts/agent_system.md")),
    (
        "evaluate_research_needs",
        include_str!("prompts/evaluate_research_needs.md"),
    ),
    ("industry_research", include_str!("prompts/industry_research.md")),
    ("project_analysis", include_str!("prompts/project_analysis.md")),
    ("team_assessment", include_str!("prompts/team_assessment.md")),
    ("research_synthesis", include_str!("prompts/research_synthesis.md")),
    ("generate_tasks", include_str!("prompts/generate_tasks.md")),
    ("card_specifications", include_str!("prompts/card_specifications.md")),
    ("create_card", include_str!("prompts/create_card.md")),
];

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .expect("built-in prompt templates should be valid");
        }
        Self { env }
    }

    /// Engine with one extra template, for tests and ad-hoc pipelines.
    pub fn with_template(mut self, name: &'static str, source: &'static str) -> Result<Self> {
        self.env
            .add_template(name, source)
            .with_context(|| format!("compile template {name}"))?;
        Ok(self)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("unknown template {name}"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render template {name}"))?;
        debug!(template = name, bytes = rendered.len(), "rendered prompt");
        Ok(rendered.trim().to_string())
    }
}
