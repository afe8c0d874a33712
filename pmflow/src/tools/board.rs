//! Board tools: one [`BoardTool`] per board operation an agent may perform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::core::status_line::{success, success_with_id};
use crate::core::types::LabelColor;
use crate::io::board::{BoardClient, CardUpdate, NewCard, NewLabel, NewList};
use crate::tools::{Tool, ToolOutput, parse_args};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardOp {
    CreateList,
    UpdateList,
    DeleteList,
    CreateCard,
    UpdateCard,
    DeleteCard,
    MoveCard,
    CreateChecklist,
    UpdateChecklist,
    DeleteChecklist,
    AddChecklistItem,
    CreateLabel,
    UpdateLabel,
    DeleteLabel,
    AddLabelToCard,
    RemoveLabelFromCard,
}

impl BoardOp {
    pub const ALL: [BoardOp; 16] = [
        BoardOp::CreateList,
        BoardOp::UpdateList,
        BoardOp::DeleteList,
        BoardOp::CreateCard,
        BoardOp::UpdateCard,
        BoardOp::DeleteCard,
        BoardOp::MoveCard,
        BoardOp::CreateChecklist,
        BoardOp::UpdateChecklist,
        BoardOp::DeleteChecklist,
        BoardOp::AddChecklistItem,
        BoardOp::CreateLabel,
        BoardOp::UpdateLabel,
        BoardOp::DeleteLabel,
        BoardOp::AddLabelToCard,
        BoardOp::RemoveLabelFromCard,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BoardOp::CreateList => "create_list",
            BoardOp::UpdateList => "update_list",
            BoardOp::DeleteList => "delete_list",
            BoardOp::CreateCard => "create_card",
            BoardOp::UpdateCard => "update_card",
            BoardOp::DeleteCard => "delete_card",
            BoardOp::MoveCard => "move_card",
            BoardOp::CreateChecklist => "create_checklist",
            BoardOp::UpdateChecklist => "update_checklist",
            BoardOp::DeleteChecklist => "delete_checklist",
            BoardOp::AddChecklistItem => "add_checklist_item",
            BoardOp::CreateLabel => "create_label",
            BoardOp::UpdateLabel => "update_label",
            BoardOp::DeleteLabel => "delete_label",
            BoardOp::AddLabelToCard => "add_label_to_card",
            BoardOp::RemoveLabelFromCard => "remove_label_from_card",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            BoardOp::CreateList => {
                "Creates a new list on a board. Position 1 is the leftmost list."
            }
            BoardOp::UpdateList => "Renames an existing list.",
            BoardOp::DeleteList => "Closes (archives) a list. This cannot be undone by agents.",
            BoardOp::CreateCard => {
                "Creates a card (task) in a list with a description, optional assignees, \
                 start date and due date (YYYY-MM-DD). Returns the new card ID."
            }
            BoardOp::UpdateCard => "Updates a card's name, description, assignees or dates.",
            BoardOp::DeleteCard => "Deletes a card permanently.",
            BoardOp::MoveCard => "Moves a card to another list.",
            BoardOp::CreateChecklist => {
                "Creates a checklist on a card. Returns the new checklist ID."
            }
            BoardOp::UpdateChecklist => "Renames a checklist.",
            BoardOp::DeleteChecklist => "Deletes a checklist from a card.",
            BoardOp::AddChecklistItem => "Adds an item to an existing checklist.",
            BoardOp::CreateLabel => {
                "Creates a colored label and attaches it to a card. Colors: yellow, purple, \
                 blue, red, green, orange, black, sky, pink, lime."
            }
            BoardOp::UpdateLabel => "Changes a label's name and color.",
            BoardOp::DeleteLabel => "Deletes a label.",
            BoardOp::AddLabelToCard => "Attaches an existing label to a card.",
            BoardOp::RemoveLabelFromCard => "Detaches a label from a card.",
        }
    }

    /// Gerund used in failure lines (`❌ Error creating card: ...`).
    fn action(&self) -> &'static str {
        match self {
            BoardOp::CreateList => "creating list",
            BoardOp::UpdateList => "updating list",
            BoardOp::DeleteList => "deleting list",
            BoardOp::CreateCard => "creating card",
            BoardOp::UpdateCard => "updating card",
            BoardOp::DeleteCard => "deleting card",
            BoardOp::MoveCard => "moving card",
            BoardOp::CreateChecklist => "creating checklist",
            BoardOp::UpdateChecklist => "updating checklist",
            BoardOp::DeleteChecklist => "deleting checklist",
            BoardOp::AddChecklistItem => "adding checklist item",
            BoardOp::CreateLabel => "creating label",
            BoardOp::UpdateLabel => "updating label",
            BoardOp::DeleteLabel => "deleting label",
            BoardOp::AddLabelToCard => "adding label to card",
            BoardOp::RemoveLabelFromCard => "removing label from card",
        }
    }

    fn parameters(&self) -> Value {
        let id = |what: &str| json!({"type": "string", "description": format!("The {what} ID")});
        let text = |what: &str| json!({"type": "string", "description": what});
        let date = |what: &str| {
            json!({"type": "string", "description": format!("{what} in YYYY-MM-DD format")})
        };
        let members = json!({
            "type": "array",
            "items": {"type": "string"},
            "description": "Board member IDs to assign"
        });
        let color = json!({
            "type": "string",
            "enum": LabelColor::ALL.iter().map(LabelColor::as_str).collect::<Vec<_>>()
        });

        let (properties, required) = match self {
            BoardOp::CreateList => (
                json!({
                    "board_id": id("board"),
                    "list_name": text("Name of the list (e.g. 'To Do')"),
                    "position": {"type": "integer", "minimum": 1, "description": "1 = leftmost"}
                }),
                vec!["board_id", "list_name"],
            ),
            BoardOp::UpdateList => (
                json!({"list_id": id("list"), "list_name": text("New name for the list")}),
                vec!["list_id", "list_name"],
            ),
            BoardOp::DeleteList => (json!({"list_id": id("list")}), vec!["list_id"]),
            BoardOp::CreateCard => (
                json!({
                    "list_id": id("list"),
                    "card_name": text("Name/title of the card"),
                    "description": text("Detailed description of the task"),
                    "team_member_ids": members,
                    "start_date": date("Start date"),
                    "end_date": date("Due date")
                }),
                vec!["list_id", "card_name", "description"],
            ),
            BoardOp::UpdateCard => (
                json!({
                    "card_id": id("card"),
                    "card_name": text("New name/title of the card"),
                    "description": text("Updated description"),
                    "team_member_ids": members,
                    "start_date": date("Start date"),
                    "end_date": date("Due date")
                }),
                vec!["card_id"],
            ),
            BoardOp::DeleteCard => (json!({"card_id": id("card")}), vec!["card_id"]),
            BoardOp::MoveCard => (
                json!({"card_id": id("card"), "list_id": id("destination list")}),
                vec!["card_id", "list_id"],
            ),
            BoardOp::CreateChecklist => (
                json!({"card_id": id("card"), "checklist_name": text("Name of the checklist")}),
                vec!["card_id", "checklist_name"],
            ),
            BoardOp::UpdateChecklist => (
                json!({
                    "checklist_id": id("checklist"),
                    "checklist_name": text("New name for the checklist")
                }),
                vec!["checklist_id", "checklist_name"],
            ),
            BoardOp::DeleteChecklist => {
                (json!({"checklist_id": id("checklist")}), vec!["checklist_id"])
            }
            BoardOp::AddChecklistItem => (
                json!({"checklist_id": id("checklist"), "item_name": text("Checklist item text")}),
                vec!["checklist_id", "item_name"],
            ),
            BoardOp::CreateLabel => (
                json!({"card_id": id("card"), "label_name": text("Name of the label"), "color": color}),
                vec!["card_id", "label_name"],
            ),
            BoardOp::UpdateLabel => (
                json!({"label_id": id("label"), "label_name": text("New name"), "color": color}),
                vec!["label_id", "label_name", "color"],
            ),
            BoardOp::DeleteLabel => (json!({"label_id": id("label")}), vec!["label_id"]),
            BoardOp::AddLabelToCard | BoardOp::RemoveLabelFromCard => (
                json!({"card_id": id("card"), "label_id": id("label")}),
                vec!["card_id", "label_id"],
            ),
        };
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateListInput {
    board_id: String,
    list_name: String,
    #[serde(default = "first_position")]
    position: u32,
}

fn first_position() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateListInput {
    list_id: String,
    list_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListRef {
    list_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateCardInput {
    list_id: String,
    card_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    team_member_ids: Option<Value>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateCardInput {
    card_id: String,
    #[serde(default)]
    card_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    team_member_ids: Option<Value>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CardRef {
    card_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveCardInput {
    card_id: String,
    list_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateChecklistInput {
    card_id: String,
    checklist_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateChecklistInput {
    checklist_id: String,
    checklist_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChecklistRef {
    checklist_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddChecklistItemInput {
    checklist_id: String,
    item_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateLabelInput {
    card_id: String,
    label_name: String,
    #[serde(default = "default_color")]
    color: String,
}

fn default_color() -> String {
    LabelColor::Blue.as_str().to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateLabelInput {
    label_id: String,
    label_name: String,
    color: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LabelRef {
    label_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CardLabelInput {
    card_id: String,
    label_id: String,
}

fn require<'a>(field: &str, value: &'a str) -> Result<&'a str, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} must not be blank"));
    }
    Ok(trimmed)
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, String> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("invalid {field} '{raw}': expected YYYY-MM-DD")),
    }
}

fn parse_color(raw: &str) -> Result<LabelColor, String> {
    LabelColor::parse(raw).ok_or_else(|| {
        let allowed: Vec<&str> = LabelColor::ALL.iter().map(LabelColor::as_str).collect();
        format!(
            "unsupported label color '{raw}' (expected one of: {})",
            allowed.join(", ")
        )
    })
}

/// Member ids arrive either as a JSON array or as a JSON-encoded string of one.
fn parse_member_ids(raw: Option<Value>) -> Result<Vec<String>, String> {
    let value = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(encoded)) => serde_json::from_str(&encoded)
            .map_err(|err| format!("team_member_ids is not a JSON array: {err}"))?,
        Some(other) => other,
    };
    let ids: Vec<String> = serde_json::from_value(value)
        .map_err(|err| format!("team_member_ids must be an array of strings: {err}"))?;
    Ok(ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

/// One board operation exposed as a tool.
pub struct BoardTool {
    op: BoardOp,
    board: Arc<dyn BoardClient>,
    timeout: Duration,
}

impl BoardTool {
    pub fn new(op: BoardOp, board: Arc<dyn BoardClient>, timeout: Duration) -> Self {
        Self { op, board, timeout }
    }

    async fn run(&self, args: Value) -> Result<ToolOutput, String> {
        let board = self.board.as_ref();
        match self.op {
            BoardOp::CreateList => {
                let input: CreateListInput = parse_args(args)?;
                let list = NewList {
                    board_id: require("board_id", &input.board_id)?.to_string(),
                    name: require("list_name", &input.list_name)?.to_string(),
                    position: input.position.max(1),
                };
                let entity = board.create_list(&list).await.map_err(|e| e.to_string())?;
                let line = success_with_id("created list", &list.name, &entity.id);
                Ok(ToolOutput::created(
                    format!("{line} on board {}", list.board_id),
                    &entity.id,
                ))
            }
            BoardOp::UpdateList => {
                let input: UpdateListInput = parse_args(args)?;
                let list_id = require("list_id", &input.list_id)?;
                let name = require("list_name", &input.list_name)?;
                board
                    .update_list(list_id, Some(name), None)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "updated list {list_id} to '{name}'"
                ))))
            }
            BoardOp::DeleteList => {
                let input: ListRef = parse_args(args)?;
                let list_id = require("list_id", &input.list_id)?;
                board.close_list(list_id).await.map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "deleted list {list_id}"
                ))))
            }
            BoardOp::CreateCard => {
                let input: CreateCardInput = parse_args(args)?;
                let card = NewCard {
                    list_id: require("list_id", &input.list_id)?.to_string(),
                    name: require("card_name", &input.card_name)?.to_string(),
                    description: input.description,
                    start: parse_date("start_date", input.start_date.as_deref())?,
                    due: parse_date("end_date", input.end_date.as_deref())?,
                    member_ids: parse_member_ids(input.team_member_ids)?,
                };
                let entity = board.create_card(&card).await.map_err(|e| e.to_string())?;
                let line = success_with_id("created card", &card.name, &entity.id);
                Ok(ToolOutput::created(
                    format!("{line} in list {}", card.list_id),
                    &entity.id,
                ))
            }
            BoardOp::UpdateCard => {
                let input: UpdateCardInput = parse_args(args)?;
                let card_id = require("card_id", &input.card_id)?;
                let update = CardUpdate {
                    name: input.card_name.filter(|name| !name.trim().is_empty()),
                    description: input.description,
                    start: parse_date("start_date", input.start_date.as_deref())?,
                    due: parse_date("end_date", input.end_date.as_deref())?,
                    member_ids: match input.team_member_ids {
                        None => None,
                        raw => Some(parse_member_ids(raw)?),
                    },
                };
                if update.is_empty() {
                    return Err("nothing to update".to_string());
                }
                let entity = board
                    .update_card(card_id, &update)
                    .await
                    .map_err(|e| e.to_string())?;
                let name = update
                    .name
                    .as_deref()
                    .or(entity.name.as_deref())
                    .unwrap_or(card_id);
                Ok(ToolOutput::success(success_with_id(
                    "updated card",
                    name,
                    card_id,
                )))
            }
            BoardOp::DeleteCard => {
                let input: CardRef = parse_args(args)?;
                let card_id = require("card_id", &input.card_id)?;
                board.delete_card(card_id).await.map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "deleted card {card_id}"
                ))))
            }
            BoardOp::MoveCard => {
                let input: MoveCardInput = parse_args(args)?;
                let card_id = require("card_id", &input.card_id)?;
                let list_id = require("list_id", &input.list_id)?;
                board
                    .move_card(card_id, list_id)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "moved card {card_id} to list {list_id}"
                ))))
            }
            BoardOp::CreateChecklist => {
                let input: CreateChecklistInput = parse_args(args)?;
                let card_id = require("card_id", &input.card_id)?;
                let name = require("checklist_name", &input.checklist_name)?;
                let entity = board
                    .create_checklist(card_id, name)
                    .await
                    .map_err(|e| e.to_string())?;
                let line = success_with_id("created checklist", name, &entity.id);
                Ok(ToolOutput::created(
                    format!("{line} on card {card_id}"),
                    &entity.id,
                ))
            }
            BoardOp::UpdateChecklist => {
                let input: UpdateChecklistInput = parse_args(args)?;
                let checklist_id = require("checklist_id", &input.checklist_id)?;
                let name = require("checklist_name", &input.checklist_name)?;
                board
                    .update_checklist(checklist_id, name)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "updated checklist {checklist_id} to '{name}'"
                ))))
            }
            BoardOp::DeleteChecklist => {
                let input: ChecklistRef = parse_args(args)?;
                let checklist_id = require("checklist_id", &input.checklist_id)?;
                board
                    .delete_checklist(checklist_id)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "deleted checklist {checklist_id}"
                ))))
            }
            BoardOp::AddChecklistItem => {
                let input: AddChecklistItemInput = parse_args(args)?;
                let checklist_id = require("checklist_id", &input.checklist_id)?;
                let item = require("item_name", &input.item_name)?;
                let entity = board
                    .add_checklist_item(checklist_id, item)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::created(
                    success(&format!(
                        "added item '{item}' to checklist {checklist_id}"
                    )),
                    &entity.id,
                ))
            }
            BoardOp::CreateLabel => {
                let input: CreateLabelInput = parse_args(args)?;
                let card_id = require("card_id", &input.card_id)?;
                let label = NewLabel {
                    name: require("label_name", &input.label_name)?.to_string(),
                    color: parse_color(input.color.trim())?,
                };
                let entity = board
                    .create_label(card_id, &label)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::created(
                    success(&format!(
                        "created {} label '{}' (ID: {}) on card {card_id}",
                        label.color, label.name, entity.id
                    )),
                    &entity.id,
                ))
            }
            BoardOp::UpdateLabel => {
                let input: UpdateLabelInput = parse_args(args)?;
                let label_id = require("label_id", &input.label_id)?;
                let name = require("label_name", &input.label_name)?;
                let color = parse_color(input.color.trim())?;
                board
                    .update_label(label_id, Some(name), Some(color))
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "updated label {label_id} to '{name}' ({color})"
                ))))
            }
            BoardOp::DeleteLabel => {
                let input: LabelRef = parse_args(args)?;
                let label_id = require("label_id", &input.label_id)?;
                board.delete_label(label_id).await.map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "deleted label {label_id}"
                ))))
            }
            BoardOp::AddLabelToCard => {
                let input: CardLabelInput = parse_args(args)?;
                let card_id = require("card_id", &input.card_id)?;
                let label_id = require("label_id", &input.label_id)?;
                board
                    .add_label_to_card(card_id, label_id)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "added label {label_id} to card {card_id}"
                ))))
            }
            BoardOp::RemoveLabelFromCard => {
                let input: CardLabelInput = parse_args(args)?;
                let card_id = require("card_id", &input.card_id)?;
                let label_id = require("label_id", &input.label_id)?;
                board
                    .remove_label_from_card(card_id, label_id)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ToolOutput::success(success(&format!(
                    "removed label {label_id} from card {card_id}"
                ))))
            }
        }
    }
}

#[async_trait]
impl Tool for BoardTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        self.op.parameters()
    }

    #[instrument(skip_all, fields(tool = self.op.name()))]
    async fn call(&self, args: Value) -> ToolOutput {
        match tokio::time::timeout(self.timeout, self.run(args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                warn!(%error, "board tool failed");
                ToolOutput::failure(self.op.action(), &error)
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "board tool timed out");
                ToolOutput::failure(
                    self.op.action(),
                    &format!("timed out after {}s", self.timeout.as_secs_f64()),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status_line::extract_id;
    use crate::test_support::{FakeBoard, date};

    fn tool(op: BoardOp, board: &Arc<FakeBoard>) -> BoardTool {
        BoardTool::new(op, board.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn create_card_reports_id_in_line_and_field() {
        let board = Arc::new(FakeBoard::new());
        let output = tool(BoardOp::CreateCard, &board)
            .call(json!({
                "list_id": "L1",
                "card_name": "Design Schema",
                "description": "Tables",
                "team_member_ids": "[\"m1\"]",
                "start_date": "2025-11-17",
                "end_date": "2025-11-19"
            }))
            .await;
        assert!(output.ok, "{}", output.message);
        assert_eq!(
            output.message,
            "✅ Successfully created card 'Design Schema' (ID: card-1) in list L1"
        );
        assert_eq!(output.created_id.as_deref(), Some("card-1"));
        assert_eq!(extract_id(&output.message), Some("card-1"));

        let state = board.snapshot();
        assert_eq!(state.cards[0].due, Some(date("2025-11-19")));
        assert_eq!(state.cards[0].start, Some(date("2025-11-17")));
        assert_eq!(state.cards[0].member_ids, vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn bad_inputs_become_failure_lines() {
        let board = Arc::new(FakeBoard::new());
        let create = tool(BoardOp::CreateCard, &board);

        let unknown_field = create
            .call(json!({"list_id": "L1", "card_name": "x", "priority": "high"}))
            .await;
        assert!(!unknown_field.ok);
        assert!(unknown_field.message.starts_with("❌ Error creating card:"));

        let blank_id = create.call(json!({"list_id": " ", "card_name": "x"})).await;
        assert!(blank_id.message.contains("list_id must not be blank"));

        let bad_date = create
            .call(json!({"list_id": "L1", "card_name": "x", "end_date": "19/11/2025"}))
            .await;
        assert!(bad_date.message.contains("expected YYYY-MM-DD"));

        let bad_color = tool(BoardOp::CreateLabel, &board)
            .call(json!({"card_id": "c", "label_name": "x", "color": "magenta"}))
            .await;
        assert!(bad_color.message.contains("unsupported label color 'magenta'"));

        assert!(board.snapshot().cards.is_empty());
    }

    #[tokio::test]
    async fn service_errors_are_reported_not_raised() {
        let board = Arc::new(FakeBoard::new());
        board.fail_op("create_checklist");
        let output = tool(BoardOp::CreateChecklist, &board)
            .call(json!({"card_id": "card-9", "checklist_name": "Acceptance Criteria"}))
            .await;
        assert!(!output.ok);
        assert_eq!(
            output.message,
            "❌ Error creating checklist: board service returned 500: injected failure"
        );
        assert_eq!(output.created_id, None);
    }

    #[tokio::test]
    async fn slow_board_call_times_out() {
        let board = Arc::new(FakeBoard::new().with_delay(Duration::from_millis(200)));
        let output = BoardTool::new(BoardOp::CreateList, board.clone(), Duration::from_millis(10))
            .call(json!({"board_id": "B1", "list_name": "Backlog"}))
            .await;
        assert!(!output.ok);
        assert!(output.message.starts_with("❌ Error creating list: timed out"));
    }

    #[tokio::test]
    async fn label_and_checklist_lines_follow_board_conventions() {
        let board = Arc::new(FakeBoard::new());
        let label = tool(BoardOp::CreateLabel, &board)
            .call(json!({"card_id": "card-1", "label_name": "High Priority", "color": "orange"}))
            .await;
        assert_eq!(
            label.message,
            "✅ Successfully created orange label 'High Priority' (ID: label-1) on card card-1"
        );
        let list = tool(BoardOp::CreateList, &board)
            .call(json!({"board_id": "B1", "list_name": "To Do", "position": 2}))
            .await;
        assert_eq!(
            list.message,
            "✅ Successfully created list 'To Do' (ID: list-2) on board B1"
        );
        assert_eq!(board.snapshot().lists[0].position, 2);
    }

    /// Verifies lines for calls that create nothing carry no id.
    #[tokio::test]
    async fn move_and_delete_lines_carry_no_id() {
        let board = Arc::new(FakeBoard::new());
        let created = tool(BoardOp::CreateCard, &board)
            .call(json!({"list_id": "L1", "card_name": "Design Schema"}))
            .await;
        let card_id = created.created_id.expect("card id");

        let moved = tool(BoardOp::MoveCard, &board)
            .call(json!({"card_id": card_id, "list_id": "L2"}))
            .await;
        assert_eq!(
            moved.message,
            format!("✅ Successfully moved card {card_id} to list L2")
        );
        assert_eq!(moved.created_id, None);
        assert_eq!(extract_id(&moved.message), None);

        let deleted = tool(BoardOp::DeleteCard, &board)
            .call(json!({"card_id": card_id}))
            .await;
        assert_eq!(deleted.message, format!("✅ Successfully deleted card {card_id}"));
        assert!(board.snapshot().cards.is_empty());
    }

    #[test]
    fn member_ids_accept_arrays_and_encoded_strings() {
        assert_eq!(
            parse_member_ids(Some(json!(["a", " ", "b"]))),
            Ok(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            parse_member_ids(Some(json!("[\"a\"]"))),
            Ok(vec!["a".to_string()])
        );
        assert_eq!(parse_member_ids(Some(json!(""))), Ok(Vec::new()));
        assert!(parse_member_ids(Some(json!("not json"))).is_err());
    }

    #[test]
    fn every_schema_requires_declared_properties() {
        for op in BoardOp::ALL {
            let schema = op.parameters();
            let properties = schema["properties"].as_object().expect("properties");
            for required in schema["required"].as_array().expect("required") {
                let name = required.as_str().expect("name");
                assert!(properties.contains_key(name), "{} {name}", op.name());
            }
        }
    }
}
