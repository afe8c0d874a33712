//! Semantic invariants on planning output not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::types::{CardSpecification, Timeline};

/// Default lower bound on the number of planned cards.
pub const DEFAULT_MIN_CARDS: usize = 10;

/// Board-specific facts card specifications are checked against.
#[derive(Debug, Clone)]
pub struct CardSpecRules {
    pub min_cards: usize,
    /// List ids a card may target. Empty means any id is accepted.
    pub allowed_list_ids: HashSet<String>,
    /// When set, every card date must fall inside the project timeline.
    pub timeline: Option<Timeline>,
}

impl Default for CardSpecRules {
    fn default() -> Self {
        Self {
            min_cards: DEFAULT_MIN_CARDS,
            allowed_list_ids: HashSet::new(),
            timeline: None,
        }
    }
}

/// Check semantic invariants:
/// - At least `min_cards` specifications
/// - Non-blank card names
/// - `list_id` refers to a created list
/// - `start_date <= end_date`, both inside the project timeline
pub fn validate_card_specs(specs: &[CardSpecification], rules: &CardSpecRules) -> Vec<String> {
    let mut errors = Vec::new();

    if specs.len() < rules.min_cards {
        errors.push(format!(
            "expected at least {} card specifications, got {}",
            rules.min_cards,
            specs.len()
        ));
    }

    for (idx, spec) in specs.iter().enumerate() {
        let at = format!("card_specifications[{idx}]");
        if spec.card_name.trim().is_empty() {
            errors.push(format!("{at}: card_name must not be blank"));
        }
        if spec.list_id.trim().is_empty() {
            errors.push(format!("{at}: list_id must not be blank"));
        } else if !rules.allowed_list_ids.is_empty()
            && !rules.allowed_list_ids.contains(&spec.list_id)
        {
            errors.push(format!("{at}: unknown list_id '{}'", spec.list_id));
        }
        if spec.start_date > spec.end_date {
            errors.push(format!(
                "{at}: start_date {} is after end_date {}",
                spec.start_date, spec.end_date
            ));
        }
        if let Some(timeline) = &rules.timeline {
            if !timeline.contains(spec.start_date) || !timeline.contains(spec.end_date) {
                errors.push(format!(
                    "{at}: dates {}..{} fall outside the project timeline {}",
                    spec.start_date, spec.end_date, timeline
                ));
            }
        }
        for (label_idx, label) in spec.labels.iter().enumerate() {
            if label.name.trim().is_empty() {
                errors.push(format!("{at}.labels[{label_idx}]: name must not be blank"));
            }
        }
    }

    errors
}
