//! Board service client.
//!
//! [`BoardClient`] is the seam between the flow and the Kanban service. The
//! production implementation talks to the Trello REST API; tests use the
//! in-memory board from `test_support`. Calls are at-most-once: nothing here
//! retries, caches or deduplicates.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::types::LabelColor;

/// Failure of one board call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("board request failed: {0}")]
    Transport(String),
    #[error("board request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected board response: {0}")]
    Decode(String),
    #[error("invalid board request: {0}")]
    Invalid(String),
}

/// A created or updated entity: its id plus the service's JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEntity {
    pub id: String,
    pub name: Option<String>,
    pub raw: Value,
}

impl BoardEntity {
    pub fn from_value(raw: Value) -> Result<Self, BoardError> {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BoardError::Decode("response has no id".to_string()))?
            .to_string();
        let name = raw.get("name").and_then(Value::as_str).map(str::to_string);
        Ok(Self { id, name, raw })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMember {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBoard {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewList {
    pub board_id: String,
    pub name: String,
    /// 1-based position on the board.
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCard {
    pub list_id: String,
    pub name: String,
    pub description: String,
    pub start: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    /// Replaces the card's members when set.
    pub member_ids: Option<Vec<String>>,
}

impl CardUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.start.is_none()
            && self.due.is_none()
            && self.member_ids.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLabel {
    pub name: String,
    pub color: LabelColor,
}

/// Operations the flow performs against the board service.
#[async_trait]
pub trait BoardClient: Send + Sync {
    async fn create_board(&self, board: &NewBoard) -> Result<BoardEntity, BoardError>;
    async fn update_board(
        &self,
        board_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<BoardEntity, BoardError>;
    async fn delete_board(&self, board_id: &str) -> Result<(), BoardError>;
    /// Invite by email; returns the board's members afterwards.
    async fn invite_member(
        &self,
        board_id: &str,
        email: &str,
        full_name: &str,
    ) -> Result<Vec<BoardMember>, BoardError>;
    async fn board_members(&self, board_id: &str) -> Result<Vec<BoardMember>, BoardError>;

    async fn create_list(&self, list: &NewList) -> Result<BoardEntity, BoardError>;
    async fn update_list(
        &self,
        list_id: &str,
        name: Option<&str>,
        position: Option<u32>,
    ) -> Result<BoardEntity, BoardError>;
    /// Lists cannot be deleted, only closed.
    async fn close_list(&self, list_id: &str) -> Result<BoardEntity, BoardError>;

    async fn create_card(&self, card: &NewCard) -> Result<BoardEntity, BoardError>;
    async fn update_card(&self, card_id: &str, update: &CardUpdate)
    -> Result<BoardEntity, BoardError>;
    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<BoardEntity, BoardError>;
    async fn delete_card(&self, card_id: &str) -> Result<(), BoardError>;

    async fn create_checklist(&self, card_id: &str, name: &str)
    -> Result<BoardEntity, BoardError>;
    async fn update_checklist(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError>;
    async fn delete_checklist(&self, checklist_id: &str) -> Result<(), BoardError>;
    async fn add_checklist_item(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError>;

    /// Create a label on the card's board and attach it to the card.
    async fn create_label(&self, card_id: &str, label: &NewLabel)
    -> Result<BoardEntity, BoardError>;
    async fn update_label(
        &self,
        label_id: &str,
        name: Option<&str>,
        color: Option<LabelColor>,
    ) -> Result<BoardEntity, BoardError>;
    async fn delete_label(&self, label_id: &str) -> Result<(), BoardError>;
    async fn add_label_to_card(&self, card_id: &str, label_id: &str) -> Result<(), BoardError>;
    async fn remove_label_from_card(&self, card_id: &str, label_id: &str)
    -> Result<(), BoardError>;
}

/// Trello REST client with key/token query authentication.
pub struct TrelloClient {
    base_url: String,
    api_key: String,
    api_token: String,
    timeout: Duration,
    http: reqwest::Client,
}

type Params = Vec<(&'static str, String)>;

impl TrelloClient {
    pub fn new(base_url: &str, api_key: &str, api_token: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_token: api_token.to_string(),
            timeout,
            http,
        }
    }

    #[instrument(skip(self, params))]
    async fn send(&self, method: Method, path: &str, params: Params) -> Result<Value, BoardError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .request(method, &url)
            .query(&[("key", self.api_key.as_str()), ("token", self.api_token.as_str())])
            .query(&params)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "board request rejected");
            return Err(BoardError::Service {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }
        debug!(status = status.as_u16(), bytes = body.len(), "board request ok");
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| BoardError::Decode(err.to_string()))
    }

    async fn send_entity(
        &self,
        method: Method,
        path: &str,
        params: Params,
    ) -> Result<BoardEntity, BoardError> {
        BoardEntity::from_value(self.send(method, path, params).await?)
    }

    fn transport_error(&self, err: reqwest::Error) -> BoardError {
        if err.is_timeout() {
            BoardError::Timeout(self.timeout)
        } else {
            // Drop the URL: it carries the key and token.
            BoardError::Transport(err.without_url().to_string())
        }
    }
}

fn members_from(value: Value) -> Result<Vec<BoardMember>, BoardError> {
    let members = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove("members").unwrap_or(Value::Array(Vec::new())),
        other => return Err(BoardError::Decode(format!("expected members, got {other}"))),
    };
    serde_json::from_value(members).map_err(|err| BoardError::Decode(err.to_string()))
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl BoardClient for TrelloClient {
    async fn create_board(&self, board: &NewBoard) -> Result<BoardEntity, BoardError> {
        let params = vec![
            ("name", board.name.clone()),
            ("desc", board.description.clone()),
            ("defaultLists", "false".to_string()),
        ];
        self.send_entity(Method::POST, "/boards/", params).await
    }

    async fn update_board(
        &self,
        board_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<BoardEntity, BoardError> {
        let mut params = Params::new();
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }
        if let Some(description) = description {
            params.push(("desc", description.to_string()));
        }
        self.send_entity(Method::PUT, &format!("/boards/{board_id}"), params)
            .await
    }

    async fn delete_board(&self, board_id: &str) -> Result<(), BoardError> {
        self.send(Method::DELETE, &format!("/boards/{board_id}"), Params::new())
            .await
            .map(|_| ())
    }

    async fn invite_member(
        &self,
        board_id: &str,
        email: &str,
        full_name: &str,
    ) -> Result<Vec<BoardMember>, BoardError> {
        let params = vec![
            ("email", email.to_string()),
            ("fullName", full_name.to_string()),
            ("type", "normal".to_string()),
        ];
        let value = self
            .send(Method::PUT, &format!("/boards/{board_id}/members"), params)
            .await?;
        members_from(value)
    }

    async fn board_members(&self, board_id: &str) -> Result<Vec<BoardMember>, BoardError> {
        let value = self
            .send(Method::GET, &format!("/boards/{board_id}/members"), Params::new())
            .await?;
        members_from(value)
    }

    async fn create_list(&self, list: &NewList) -> Result<BoardEntity, BoardError> {
        let params = vec![
            ("name", list.name.clone()),
            ("idBoard", list.board_id.clone()),
            ("pos", list.position.to_string()),
        ];
        self.send_entity(Method::POST, "/lists", params).await
    }

    async fn update_list(
        &self,
        list_id: &str,
        name: Option<&str>,
        position: Option<u32>,
    ) -> Result<BoardEntity, BoardError> {
        let mut params = Params::new();
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }
        if let Some(position) = position {
            params.push(("pos", position.to_string()));
        }
        self.send_entity(Method::PUT, &format!("/lists/{list_id}"), params)
            .await
    }

    async fn close_list(&self, list_id: &str) -> Result<BoardEntity, BoardError> {
        let params = vec![("value", "true".to_string())];
        self.send_entity(Method::PUT, &format!("/lists/{list_id}/closed"), params)
            .await
    }

    async fn create_card(&self, card: &NewCard) -> Result<BoardEntity, BoardError> {
        let mut params = vec![
            ("idList", card.list_id.clone()),
            ("name", card.name.clone()),
            ("desc", card.description.clone()),
        ];
        if let Some(start) = card.start {
            params.push(("start", date_param(start)));
        }
        if let Some(due) = card.due {
            params.push(("due", date_param(due)));
        }
        if !card.member_ids.is_empty() {
            params.push(("idMembers", card.member_ids.join(",")));
        }
        self.send_entity(Method::POST, "/cards", params).await
    }

    async fn update_card(
        &self,
        card_id: &str,
        update: &CardUpdate,
    ) -> Result<BoardEntity, BoardError> {
        if update.is_empty() {
            return Err(BoardError::Invalid("card update has no fields".to_string()));
        }
        let mut params = Params::new();
        if let Some(name) = &update.name {
            params.push(("name", name.clone()));
        }
        if let Some(description) = &update.description {
            params.push(("desc", description.clone()));
        }
        if let Some(start) = update.start {
            params.push(("start", date_param(start)));
        }
        if let Some(due) = update.due {
            params.push(("due", date_param(due)));
        }
        if let Some(member_ids) = &update.member_ids {
            params.push(("idMembers", member_ids.join(",")));
        }
        self.send_entity(Method::PUT, &format!("/cards/{card_id}"), params)
            .await
    }

    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<BoardEntity, BoardError> {
        let params = vec![("idList", list_id.to_string())];
        self.send_entity(Method::PUT, &format!("/cards/{card_id}"), params)
            .await
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), BoardError> {
        self.send(Method::DELETE, &format!("/cards/{card_id}"), Params::new())
            .await
            .map(|_| ())
    }

    async fn create_checklist(
        &self,
        card_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError> {
        let params = vec![("name", name.to_string())];
        self.send_entity(Method::POST, &format!("/cards/{card_id}/checklists"), params)
            .await
    }

    async fn update_checklist(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError> {
        let params = vec![("name", name.to_string())];
        self.send_entity(Method::PUT, &format!("/checklists/{checklist_id}"), params)
            .await
    }

    async fn delete_checklist(&self, checklist_id: &str) -> Result<(), BoardError> {
        self.send(
            Method::DELETE,
            &format!("/checklists/{checklist_id}"),
            Params::new(),
        )
        .await
        .map(|_| ())
    }

    async fn add_checklist_item(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError> {
        let params = vec![("name", name.to_string())];
        self.send_entity(
            Method::POST,
            &format!("/checklists/{checklist_id}/checkItems"),
            params,
        )
        .await
    }

    async fn create_label(
        &self,
        card_id: &str,
        label: &NewLabel,
    ) -> Result<BoardEntity, BoardError> {
        let params = vec![
            ("name", label.name.clone()),
            ("color", label.color.as_str().to_string()),
        ];
        self.send_entity(Method::POST, &format!("/cards/{card_id}/labels"), params)
            .await
    }

    async fn update_label(
        &self,
        label_id: &str,
        name: Option<&str>,
        color: Option<LabelColor>,
    ) -> Result<BoardEntity, BoardError> {
        let mut params = Params::new();
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }
        if let Some(color) = color {
            params.push(("color", color.as_str().to_string()));
        }
        self.send_entity(Method::PUT, &format!("/labels/{label_id}"), params)
            .await
    }

    async fn delete_label(&self, label_id: &str) -> Result<(), BoardError> {
        self.send(Method::DELETE, &format!("/labels/{label_id}"), Params::new())
            .await
            .map(|_| ())
    }

    async fn add_label_to_card(&self, card_id: &str, label_id: &str) -> Result<(), BoardError> {
        let params = vec![("value", label_id.to_string())];
        self.send(Method::POST, &format!("/cards/{card_id}/idLabels"), params)
            .await
            .map(|_| ())
    }

    async fn remove_label_from_card(
        &self,
        card_id: &str,
        label_id: &str,
    ) -> Result<(), BoardError> {
        self.send(
            Method::DELETE,
            &format!("/cards/{card_id}/idLabels/{label_id}"),
            Params::new(),
        )
        .await
        .map(|_| ())
    }
}
