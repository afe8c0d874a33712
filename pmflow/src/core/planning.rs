//! Card routing and labeling policy.
//!
//! Cards are not assigned to team members. Urgent work goes straight to
//! "To Do"; everything else waits in "Backlog".

use serde::Serialize;

use crate::core::types::{BoardListName, Category, Label, LabelColor, Priority};

pub fn list_for_priority(priority: Priority) -> BoardListName {
    match priority {
        Priority::Critical | Priority::High => BoardListName::ToDo,
        Priority::Medium | Priority::Low => BoardListName::Backlog,
    }
}

pub fn priority_color(priority: Priority) -> LabelColor {
    match priority {
        Priority::Critical => LabelColor::Red,
        Priority::High => LabelColor::Orange,
        Priority::Medium => LabelColor::Yellow,
        Priority::Low => LabelColor::Green,
    }
}

pub fn category_color(category: Category) -> LabelColor {
    match category {
        Category::Backend => LabelColor::Blue,
        Category::Frontend => LabelColor::Purple,
        Category::Database => LabelColor::Sky,
        Category::DevOps => LabelColor::Lime,
        Category::Testing => LabelColor::Pink,
        Category::Documentation => LabelColor::Black,
    }
}

/// `"High Priority"` / orange.
pub fn priority_label(priority: Priority) -> Label {
    Label {
        name: format!("{} Priority", priority.as_str()),
        color: priority_color(priority),
    }
}

pub fn category_label(category: Category) -> Label {
    Label {
        name: category.as_str().to_string(),
        color: category_color(category),
    }
}

/// One row of the policy table rendered into planning prompts.
#[derive(Debug, Clone, Serialize)]
pub struct LabelRule {
    pub tag: &'static str,
    pub label: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingRule {
    pub priority: &'static str,
    pub list: &'static str,
}

/// Policy tables consumed by the planning templates.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningPolicy {
    pub routing: Vec<RoutingRule>,
    pub priority_labels: Vec<LabelRule>,
    pub category_labels: Vec<LabelRule>,
}

pub fn planning_policy() -> PlanningPolicy {
    PlanningPolicy {
        routing: Priority::ALL
            .iter()
            .map(|priority| RoutingRule {
                priority: priority.as_str(),
                list: list_for_priority(*priority).display_name(),
            })
            .collect(),
        priority_labels: Priority::ALL
            .iter()
            .map(|priority| {
                let label = priority_label(*priority);
                LabelRule {
                    tag: priority.as_str(),
                    label: label.name,
                    color: label.color.as_str(),
                }
            })
            .collect(),
        category_labels: Category::ALL
            .iter()
            .map(|category| LabelRule {
                tag: category.as_str(),
                label: category.as_str().to_string(),
                color: category_color(*category).as_str(),
            })
            .collect(),
    }
}
