//! Board setup: the board, its six lists, and team invitations.
//!
//! No agent is involved; ids flow from one call to the next as values.

use std::collections::HashSet;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::types::{BoardListName, BoardLists, ProjectRequest, TeamMember};
use crate::io::board::{BoardClient, BoardError, NewBoard, NewList};

/// Create the project board and return its id.
#[instrument(skip_all, fields(project = %request.name))]
pub async fn create_board(board: &dyn BoardClient, request: &ProjectRequest) -> Result<String, BoardError> {
    let entity = board
        .create_board(&NewBoard {
            name: request.name.clone(),
            description: request.description.clone(),
        })
        .await?;
    info!(board_id = %entity.id, "board created");
    Ok(entity.id)
}

/// Create the six workflow lists in board order (positions 1 to 6).
#[instrument(skip_all, fields(board_id = %board_id))]
pub async fn create_lists(board: &dyn BoardClient, board_id: &str) -> Result<BoardLists> {
    let mut ids = Vec::with_capacity(BoardListName::ALL.len());
    for list in BoardListName::ALL {
        let entity = board
            .create_list(&NewList {
                board_id: board_id.to_string(),
                name: list.display_name().to_string(),
                position: list.position(),
            })
            .await
            .with_context(|| format!("create list '{}'", list.display_name()))?;
        ids.push(entity.id);
    }
    let [
        backlog_list_id,
        todo_list_id,
        in_progress_list_id,
        code_review_list_id,
        testing_list_id,
        done_list_id,
    ]: [String; 6] = ids
        .try_into()
        .map_err(|ids: Vec<String>| anyhow!("expected 6 list ids, got {}", ids.len()))?;
    info!("lists created");
    Ok(BoardLists {
        backlog_list_id,
        todo_list_id,
        in_progress_list_id,
        code_review_list_id,
        testing_list_id,
        done_list_id,
    })
}

/// Use `existing` when given, otherwise create a board; then create the lists.
pub async fn setup_board(
    board: &dyn BoardClient,
    request: &ProjectRequest,
    existing: Option<&str>,
) -> Result<(String, BoardLists)> {
    let board_id = match existing {
        Some(id) => id.to_string(),
        None => create_board(board, request).await.context("create board")?,
    };
    let lists = create_lists(board, &board_id).await?;
    Ok((board_id, lists))
}

/// Invite every member by email and record their board member id.
///
/// The service answers with the full member list; the invited member is the
/// one id not seen before, or failing that the one with a matching name.
/// Members already holding an id are skipped.
#[instrument(skip_all, fields(board_id = %board_id, members = members.len()))]
pub async fn invite_team(board: &dyn BoardClient, board_id: &str, members: &mut [TeamMember]) -> Result<()> {
    let mut known: HashSet<String> = board
        .board_members(board_id)
        .await
        .context("list board members")?
        .into_iter()
        .map(|member| member.id)
        .collect();

    for member in members.iter_mut() {
        if member.board_member_id.is_some() {
            continue;
        }
        let listed = board
            .invite_member(board_id, &member.email, &member.name)
            .await
            .with_context(|| format!("invite {}", member.email))?;
        let invited = listed
            .iter()
            .find(|candidate| !known.contains(&candidate.id))
            .or_else(|| {
                listed
                    .iter()
                    .find(|candidate| candidate.full_name.as_deref() == Some(member.name.as_str()))
            });
        match invited {
            Some(invited) => {
                member.assign_board_member_id(&invited.id)?;
                known.insert(invited.id.clone());
            }
            None => warn!(email = %member.email, "invited member not found in board members"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBoard, sample_request};

    #[tokio::test]
    async fn lists_are_created_in_board_order() {
        let board = FakeBoard::new();
        let (board_id, lists) = setup_board(&board, &sample_request(), None)
            .await
            .expect("setup");

        let state = board.snapshot();
        assert_eq!(state.boards[0].id, board_id);
        let names: Vec<&str> = state.lists.iter().map(|list| list.name.as_str()).collect();
        assert_eq!(
            names,
            ["Backlog", "To Do", "In Progress", "Code Review", "Testing", "Done"]
        );
        let positions: Vec<u32> = state.lists.iter().map(|list| list.position).collect();
        assert_eq!(positions, [1, 2, 3, 4, 5, 6]);
        assert_eq!(lists.backlog_list_id, state.lists[0].id);
        assert_eq!(lists.done_list_id, state.lists[5].id);
        assert!(state.lists.iter().all(|list| list.board_id == board_id));
    }

    #[tokio::test]
    async fn existing_board_is_reused() {
        let board = FakeBoard::new();
        let (board_id, _) = setup_board(&board, &sample_request(), Some("board-9"))
            .await
            .expect("setup");
        assert_eq!(board_id, "board-9");
        assert!(board.snapshot().boards.is_empty());
    }

    #[tokio::test]
    async fn list_failure_names_the_list() {
        let board = FakeBoard::new();
        board.fail_op_matching("create_list", "Code Review");
        let err = create_lists(&board, "board-1").await.expect_err("failure");
        assert!(format!("{err:#}").contains("create list 'Code Review'"));
        assert_eq!(board.snapshot().lists.len(), 3);
    }

    #[tokio::test]
    async fn invited_members_get_board_ids() {
        let board = FakeBoard::new();
        let mut request = sample_request();
        invite_team(&board, "board-1", &mut request.team_members)
            .await
            .expect("invite");
        let ids: Vec<Option<&str>> = request
            .team_members
            .iter()
            .map(|member| member.board_member_id.as_deref())
            .collect();
        assert_eq!(ids, [Some("member-1"), Some("member-2")]);

        invite_team(&board, "board-1", &mut request.team_members)
            .await
            .expect("second invite");
        let invites = board
            .snapshot()
            .calls
            .iter()
            .filter(|call| *call == "invite_member")
            .count();
        assert_eq!(invites, 2);
    }
}
