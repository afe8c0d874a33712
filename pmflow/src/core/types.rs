//! Shared deterministic types for the planning flow.
//!
//! These types define the stable contracts between pipeline stages and the
//! board. Field names on [`CardSpecification`] and [`Label`] are part of the
//! wire contract with the planning agents and must not be renamed.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Field-path keyed validation errors (`name`, `team_members[1].email`, ...).
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Project start and end dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Timeline {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

/// A member of the project team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Board member id, populated after the member is invited to the board.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_member_id: Option<String>,
}

impl TeamMember {
    /// Record the board member id. Write-once: a different id is rejected.
    pub fn assign_board_member_id(&mut self, id: &str) -> Result<()> {
        match &self.board_member_id {
            Some(existing) if existing == id => Ok(()),
            Some(existing) => bail!(
                "team member {} already has board member id {}",
                self.email,
                existing
            ),
            None => {
                self.board_member_id = Some(id.to_string());
                Ok(())
            }
        }
    }
}

/// A user's request to plan a project. Immutable once the flow starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub industry: String,
    pub timeline: Timeline,
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
}

impl ProjectRequest {
    /// Human-readable timeline (`"2025-01-06 to 2025-03-28"`).
    pub fn timeline_text(&self) -> String {
        self.timeline.to_string()
    }

    /// Field-level validation used by the HTTP boundary and the CLI.
    ///
    /// Returns an empty map when the request is acceptable.
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            push_error(&mut errors, "name", "This field may not be blank.");
        }
        if self.description.trim().is_empty() {
            push_error(&mut errors, "description", "This field may not be blank.");
        }
        if self.timeline.start_date > self.timeline.end_date {
            push_error(
                &mut errors,
                "timeline",
                "start_date must be on or before end_date.",
            );
        }
        for (idx, member) in self.team_members.iter().enumerate() {
            let prefix = format!("team_members[{idx}]");
            if member.name.trim().is_empty() {
                push_error(&mut errors, &format!("{prefix}.name"), "This field is required.");
            }
            if member.role.trim().is_empty() {
                push_error(&mut errors, &format!("{prefix}.role"), "This field is required.");
            }
            let email = member.email.trim();
            if email.is_empty() {
                push_error(&mut errors, &format!("{prefix}.email"), "This field is required.");
            } else if !looks_like_email(email) {
                push_error(
                    &mut errors,
                    &format!("{prefix}.email"),
                    "Enter a valid email address.",
                );
            }
        }
        errors
    }
}

fn push_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

/// Fixed label palette supported by the board service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Sky,
    Lime,
    Pink,
    Black,
}

impl LabelColor {
    pub const ALL: [LabelColor; 10] = [
        LabelColor::Red,
        LabelColor::Orange,
        LabelColor::Yellow,
        LabelColor::Green,
        LabelColor::Blue,
        LabelColor::Purple,
        LabelColor::Sky,
        LabelColor::Lime,
        LabelColor::Pink,
        LabelColor::Black,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelColor::Red => "red",
            LabelColor::Orange => "orange",
            LabelColor::Yellow => "yellow",
            LabelColor::Green => "green",
            LabelColor::Blue => "blue",
            LabelColor::Purple => "purple",
            LabelColor::Sky => "sky",
            LabelColor::Lime => "lime",
            LabelColor::Pink => "pink",
            LabelColor::Black => "black",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|color| color.as_str() == needle)
    }
}

impl fmt::Display for LabelColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

/// Task category tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Backend,
    Frontend,
    Database,
    DevOps,
    Testing,
    Documentation,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Backend,
        Category::Frontend,
        Category::Database,
        Category::DevOps,
        Category::Testing,
        Category::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Backend => "Backend",
            Category::Frontend => "Frontend",
            Category::Database => "Database",
            Category::DevOps => "DevOps",
            Category::Testing => "Testing",
            Category::Documentation => "Documentation",
        }
    }
}

/// The six workflow lists every planned board receives, in board order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardListName {
    Backlog,
    ToDo,
    InProgress,
    CodeReview,
    Testing,
    Done,
}

impl BoardListName {
    pub const ALL: [BoardListName; 6] = [
        BoardListName::Backlog,
        BoardListName::ToDo,
        BoardListName::InProgress,
        BoardListName::CodeReview,
        BoardListName::Testing,
        BoardListName::Done,
    ];

    /// Name shown on the board.
    pub fn display_name(&self) -> &'static str {
        match self {
            BoardListName::Backlog => "Backlog",
            BoardListName::ToDo => "To Do",
            BoardListName::InProgress => "In Progress",
            BoardListName::CodeReview => "Code Review",
            BoardListName::Testing => "Testing",
            BoardListName::Done => "Done",
        }
    }

    /// 1-based position on the board.
    pub fn position(&self) -> u32 {
        match self {
            BoardListName::Backlog => 1,
            BoardListName::ToDo => 2,
            BoardListName::InProgress => 3,
            BoardListName::CodeReview => 4,
            BoardListName::Testing => 5,
            BoardListName::Done => 6,
        }
    }
}

/// Ids of the lists created on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardLists {
    pub backlog_list_id: String,
    pub todo_list_id: String,
    pub in_progress_list_id: String,
    pub code_review_list_id: String,
    pub testing_list_id: String,
    pub done_list_id: String,
}

impl BoardLists {
    pub fn id_for(&self, list: BoardListName) -> &str {
        match list {
            BoardListName::Backlog => &self.backlog_list_id,
            BoardListName::ToDo => &self.todo_list_id,
            BoardListName::InProgress => &self.in_progress_list_id,
            BoardListName::CodeReview => &self.code_review_list_id,
            BoardListName::Testing => &self.testing_list_id,
            BoardListName::Done => &self.done_list_id,
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        BoardListName::ALL
            .iter()
            .map(|list| self.id_for(*list))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().contains(&id)
    }
}

/// A colored tag attached to exactly one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: LabelColor,
}

/// Fully-resolved description of one card to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSpecification {
    pub list_id: String,
    pub card_name: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub checklist_items: Vec<String>,
}

/// Final artifact of the planning pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSpecifications {
    pub card_specifications: Vec<CardSpecification>,
}

/// A project task produced by the task breakdown step of planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTask {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub estimated_days: f64,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Wrapper object for the task breakdown output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTasks {
    pub tasks: Vec<GeneratedTask>,
}
