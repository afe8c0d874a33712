//! Test-only fakes and fixtures: an in-memory board, a scripted chat model,
//! and deterministic project data.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use crate::core::types::{
    CardSpecification, Label, LabelColor, ProjectRequest, TeamMember, Timeline,
};
use crate::io::board::{
    BoardClient, BoardEntity, BoardError, BoardMember, CardUpdate, NewBoard, NewCard, NewLabel,
    NewList,
};
use crate::io::llm::{ChatModel, ChatRequest, ChatResponse};

/// Parse a `YYYY-MM-DD` literal.
pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("fixture date")
}

/// A valid request with two team members and a Nov 2025 – Jan 2026 timeline.
pub fn sample_request() -> ProjectRequest {
    ProjectRequest {
        name: "Storefront".to_string(),
        description: "Online store with catalog, cart and checkout.".to_string(),
        industry: "Retail".to_string(),
        timeline: Timeline {
            start_date: date("2025-11-03"),
            end_date: date("2026-01-30"),
        },
        team_members: vec![
            member("Ada", "ada@example.com", "Backend Developer"),
            member("Lin", "lin@example.com", "Frontend Developer"),
        ],
    }
}

fn member(name: &str, email: &str, role: &str) -> TeamMember {
    TeamMember {
        name: name.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        skills: Vec::new(),
        board_member_id: None,
    }
}

/// A card due 2025-11-19 with one label and two checklist items.
pub fn card_spec(name: &str, list_id: &str) -> CardSpecification {
    CardSpecification {
        list_id: list_id.to_string(),
        card_name: name.to_string(),
        description: format!("{name} description"),
        start_date: date("2025-11-17"),
        end_date: date("2025-11-19"),
        labels: vec![Label {
            name: "High Priority".to_string(),
            color: LabelColor::Orange,
        }],
        checklist_items: vec!["ER diagram created".to_string(), "Indexes added".to_string()],
    }
}

/// `count` cards named `Card 1..=count`, all in `list_id`.
pub fn card_specs(count: usize, list_id: &str) -> Vec<CardSpecification> {
    (1..=count)
        .map(|i| card_spec(&format!("Card {i}"), list_id))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBoardRecord {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeList {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub position: u32,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCard {
    pub id: String,
    pub list_id: String,
    pub name: String,
    pub description: String,
    pub start: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    pub member_ids: Vec<String>,
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeChecklist {
    pub id: String,
    pub card_id: String,
    pub name: String,
    /// Items in insertion order.
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeLabel {
    pub id: String,
    pub card_id: String,
    pub name: String,
    pub color: LabelColor,
}

/// Everything the fake board has recorded.
#[derive(Debug, Clone, Default)]
pub struct FakeBoardState {
    next_id: usize,
    pub boards: Vec<FakeBoardRecord>,
    pub members: BTreeMap<String, Vec<BoardMember>>,
    pub lists: Vec<FakeList>,
    pub cards: Vec<FakeCard>,
    pub checklists: Vec<FakeChecklist>,
    pub labels: Vec<FakeLabel>,
    /// Operation names in call order, failed calls included.
    pub calls: Vec<String>,
}

impl FakeBoardState {
    fn next_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{}", self.next_id)
    }

    pub fn cards_named(&self, name: &str) -> Vec<&FakeCard> {
        self.cards.iter().filter(|card| card.name == name).collect()
    }

    pub fn checklists_for(&self, card_id: &str) -> Vec<&FakeChecklist> {
        self.checklists
            .iter()
            .filter(|checklist| checklist.card_id == card_id)
            .collect()
    }

    pub fn labels_for(&self, card_id: &str) -> Vec<&FakeLabel> {
        self.labels
            .iter()
            .filter(|label| label.card_id == card_id)
            .collect()
    }

    fn card_mut(&mut self, card_id: &str) -> Result<&mut FakeCard, BoardError> {
        self.cards
            .iter_mut()
            .find(|card| card.id == card_id)
            .ok_or_else(|| not_found("card", card_id))
    }
}

fn not_found(kind: &str, id: &str) -> BoardError {
    BoardError::Service {
        status: 404,
        message: format!("{kind} {id} not found"),
    }
}

fn entity(id: &str, name: &str) -> BoardEntity {
    BoardEntity {
        id: id.to_string(),
        name: Some(name.to_string()),
        raw: json!({"id": id, "name": name}),
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: String,
    /// Fail only calls whose subject (usually the entity name) contains this.
    needle: Option<String>,
}

/// In-memory [`BoardClient`].
///
/// Ids are `<kind>-<n>` with one counter shared by every kind. Creating
/// children under unknown parents is allowed; updating or deleting an
/// unknown entity answers 404.
#[derive(Debug, Default)]
pub struct FakeBoard {
    state: Mutex<FakeBoardState>,
    failures: Mutex<Vec<FailureRule>>,
    delay: Option<Duration>,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call of `op` (a [`BoardClient`] method name) with a 500.
    pub fn fail_op(&self, op: &str) {
        self.lock_failures().push(FailureRule {
            op: op.to_string(),
            needle: None,
        });
    }

    /// Fail calls of `op` whose subject contains `needle`.
    pub fn fail_op_matching(&self, op: &str, needle: &str) {
        self.lock_failures().push(FailureRule {
            op: op.to_string(),
            needle: Some(needle.to_string()),
        });
    }

    pub fn snapshot(&self) -> FakeBoardState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeBoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_failures(&self) -> MutexGuard<'_, Vec<FailureRule>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, then apply injected delay and failures.
    async fn enter(&self, op: &str, subject: &str) -> Result<(), BoardError> {
        self.lock().calls.push(op.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let fails = self.lock_failures().iter().any(|rule| {
            rule.op == op
                && rule
                    .needle
                    .as_deref()
                    .is_none_or(|needle| subject.contains(needle))
        });
        if fails {
            return Err(BoardError::Service {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BoardClient for FakeBoard {
    async fn create_board(&self, board: &NewBoard) -> Result<BoardEntity, BoardError> {
        self.enter("create_board", &board.name).await?;
        let mut state = self.lock();
        let id = state.next_id("board");
        state.boards.push(FakeBoardRecord {
            id: id.clone(),
            name: board.name.clone(),
            description: board.description.clone(),
        });
        Ok(entity(&id, &board.name))
    }

    async fn update_board(
        &self,
        board_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("update_board", board_id).await?;
        let mut state = self.lock();
        let board = state
            .boards
            .iter_mut()
            .find(|board| board.id == board_id)
            .ok_or_else(|| not_found("board", board_id))?;
        if let Some(name) = name {
            board.name = name.to_string();
        }
        if let Some(description) = description {
            board.description = description.to_string();
        }
        Ok(entity(board_id, &board.name))
    }

    async fn delete_board(&self, board_id: &str) -> Result<(), BoardError> {
        self.enter("delete_board", board_id).await?;
        let mut state = self.lock();
        let before = state.boards.len();
        state.boards.retain(|board| board.id != board_id);
        if state.boards.len() == before {
            return Err(not_found("board", board_id));
        }
        Ok(())
    }

    async fn invite_member(
        &self,
        board_id: &str,
        email: &str,
        full_name: &str,
    ) -> Result<Vec<BoardMember>, BoardError> {
        self.enter("invite_member", email).await?;
        let mut state = self.lock();
        let id = state.next_id("member");
        let members = state.members.entry(board_id.to_string()).or_default();
        members.push(BoardMember {
            id,
            full_name: Some(full_name.to_string()),
            username: email.split('@').next().map(str::to_string),
        });
        Ok(members.clone())
    }

    async fn board_members(&self, board_id: &str) -> Result<Vec<BoardMember>, BoardError> {
        self.enter("board_members", board_id).await?;
        Ok(self
            .lock()
            .members
            .get(board_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_list(&self, list: &NewList) -> Result<BoardEntity, BoardError> {
        self.enter("create_list", &list.name).await?;
        let mut state = self.lock();
        let id = state.next_id("list");
        state.lists.push(FakeList {
            id: id.clone(),
            board_id: list.board_id.clone(),
            name: list.name.clone(),
            position: list.position,
            closed: false,
        });
        Ok(entity(&id, &list.name))
    }

    async fn update_list(
        &self,
        list_id: &str,
        name: Option<&str>,
        position: Option<u32>,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("update_list", list_id).await?;
        let mut state = self.lock();
        let list = state
            .lists
            .iter_mut()
            .find(|list| list.id == list_id)
            .ok_or_else(|| not_found("list", list_id))?;
        if let Some(name) = name {
            list.name = name.to_string();
        }
        if let Some(position) = position {
            list.position = position;
        }
        Ok(entity(list_id, &list.name))
    }

    async fn close_list(&self, list_id: &str) -> Result<BoardEntity, BoardError> {
        self.enter("close_list", list_id).await?;
        let mut state = self.lock();
        let list = state
            .lists
            .iter_mut()
            .find(|list| list.id == list_id)
            .ok_or_else(|| not_found("list", list_id))?;
        list.closed = true;
        Ok(entity(list_id, &list.name))
    }

    async fn create_card(&self, card: &NewCard) -> Result<BoardEntity, BoardError> {
        self.enter("create_card", &card.name).await?;
        let mut state = self.lock();
        let id = state.next_id("card");
        state.cards.push(FakeCard {
            id: id.clone(),
            list_id: card.list_id.clone(),
            name: card.name.clone(),
            description: card.description.clone(),
            start: card.start,
            due: card.due,
            member_ids: card.member_ids.clone(),
            label_ids: Vec::new(),
        });
        Ok(entity(&id, &card.name))
    }

    async fn update_card(
        &self,
        card_id: &str,
        update: &CardUpdate,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("update_card", card_id).await?;
        let mut state = self.lock();
        let card = state.card_mut(card_id)?;
        if let Some(name) = &update.name {
            card.name = name.clone();
        }
        if let Some(description) = &update.description {
            card.description = description.clone();
        }
        if update.start.is_some() {
            card.start = update.start;
        }
        if update.due.is_some() {
            card.due = update.due;
        }
        if let Some(member_ids) = &update.member_ids {
            card.member_ids = member_ids.clone();
        }
        Ok(entity(card_id, &card.name))
    }

    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<BoardEntity, BoardError> {
        self.enter("move_card", card_id).await?;
        let mut state = self.lock();
        let card = state.card_mut(card_id)?;
        card.list_id = list_id.to_string();
        Ok(entity(card_id, &card.name))
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), BoardError> {
        self.enter("delete_card", card_id).await?;
        let mut state = self.lock();
        state.card_mut(card_id)?;
        state.cards.retain(|card| card.id != card_id);
        Ok(())
    }

    async fn create_checklist(
        &self,
        card_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("create_checklist", name).await?;
        let mut state = self.lock();
        let id = state.next_id("checklist");
        state.checklists.push(FakeChecklist {
            id: id.clone(),
            card_id: card_id.to_string(),
            name: name.to_string(),
            items: Vec::new(),
        });
        Ok(entity(&id, name))
    }

    async fn update_checklist(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("update_checklist", checklist_id).await?;
        let mut state = self.lock();
        let checklist = state
            .checklists
            .iter_mut()
            .find(|checklist| checklist.id == checklist_id)
            .ok_or_else(|| not_found("checklist", checklist_id))?;
        checklist.name = name.to_string();
        Ok(entity(checklist_id, name))
    }

    async fn delete_checklist(&self, checklist_id: &str) -> Result<(), BoardError> {
        self.enter("delete_checklist", checklist_id).await?;
        let mut state = self.lock();
        let before = state.checklists.len();
        state.checklists.retain(|checklist| checklist.id != checklist_id);
        if state.checklists.len() == before {
            return Err(not_found("checklist", checklist_id));
        }
        Ok(())
    }

    async fn add_checklist_item(
        &self,
        checklist_id: &str,
        name: &str,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("add_checklist_item", name).await?;
        let mut state = self.lock();
        let id = state.next_id("item");
        let checklist = state
            .checklists
            .iter_mut()
            .find(|checklist| checklist.id == checklist_id)
            .ok_or_else(|| not_found("checklist", checklist_id))?;
        checklist.items.push(name.to_string());
        Ok(entity(&id, name))
    }

    async fn create_label(
        &self,
        card_id: &str,
        label: &NewLabel,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("create_label", &label.name).await?;
        let mut state = self.lock();
        let id = state.next_id("label");
        state.labels.push(FakeLabel {
            id: id.clone(),
            card_id: card_id.to_string(),
            name: label.name.clone(),
            color: label.color,
        });
        if let Ok(card) = state.card_mut(card_id) {
            card.label_ids.push(id.clone());
        }
        Ok(entity(&id, &label.name))
    }

    async fn update_label(
        &self,
        label_id: &str,
        name: Option<&str>,
        color: Option<LabelColor>,
    ) -> Result<BoardEntity, BoardError> {
        self.enter("update_label", label_id).await?;
        let mut state = self.lock();
        let label = state
            .labels
            .iter_mut()
            .find(|label| label.id == label_id)
            .ok_or_else(|| not_found("label", label_id))?;
        if let Some(name) = name {
            label.name = name.to_string();
        }
        if let Some(color) = color {
            label.color = color;
        }
        Ok(entity(label_id, &label.name))
    }

    async fn delete_label(&self, label_id: &str) -> Result<(), BoardError> {
        self.enter("delete_label", label_id).await?;
        let mut state = self.lock();
        let before = state.labels.len();
        state.labels.retain(|label| label.id != label_id);
        if state.labels.len() == before {
            return Err(not_found("label", label_id));
        }
        for card in &mut state.cards {
            card.label_ids.retain(|id| id != label_id);
        }
        Ok(())
    }

    async fn add_label_to_card(&self, card_id: &str, label_id: &str) -> Result<(), BoardError> {
        self.enter("add_label_to_card", label_id).await?;
        let mut state = self.lock();
        let card = state.card_mut(card_id)?;
        if !card.label_ids.iter().any(|id| id == label_id) {
            card.label_ids.push(label_id.to_string());
        }
        Ok(())
    }

    async fn remove_label_from_card(
        &self,
        card_id: &str,
        label_id: &str,
    ) -> Result<(), BoardError> {
        self.enter("remove_label_from_card", label_id).await?;
        let mut state = self.lock();
        let card = state.card_mut(card_id)?;
        card.label_ids.retain(|id| id != label_id);
        Ok(())
    }
}

/// [`ChatModel`] that replays queued responses and records every request.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: ChatResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model has no response left"))
    }
}
