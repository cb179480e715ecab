use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{info, warn};

use civitas_db::models::ChatRow;
use civitas_types::api::{ChatAskRequest, ChatAskResponse, ChatEntry, ChatHistoryResponse};

use crate::assistant::ChatTurn;
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::Actor;
use crate::{run_blocking, validation};

/// Prior messages (each a [`ChatTurn`], so five exchanges) handed to the
/// generator with each question.
const CONTEXT_MESSAGES: usize = 10;

/// Ask the assistant. The exchange is persisted only once an answer exists,
/// so a generator failure leaves history untouched.
pub async fn ask(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<ChatAskRequest>, JsonRejection>,
) -> ApiResult<Json<ChatAskResponse>> {
    let Json(req) = body?;
    let question = validation::required("message", &req.message)?;
    let user_id = actor.id();

    let recent = run_blocking(&state, move |state| Ok(state.db.recent_chat(user_id, CONTEXT_MESSAGES)?)).await?;
    let context: Vec<ChatTurn> = recent
        .into_iter()
        .map(|row| ChatTurn {
            sender: row.sender,
            message: row.message,
        })
        .collect();

    let answer = state.generator.generate(&question, &context).await.map_err(|e| {
        warn!("Chat generation failed for account {}: {}", user_id, e);
        ApiError::Upstream(e.to_string())
    })?;

    let response = answer.clone();
    let history = run_blocking(&state, move |state| {
        Ok(state.db.append_chat_exchange(user_id, &question, &answer)?)
    })
    .await?;

    Ok(Json(ChatAskResponse {
        response,
        history: history.iter().map(chat_entry).collect(),
    }))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<ChatHistoryResponse>> {
    let user_id = actor.id();
    let rows = run_blocking(&state, move |state| Ok(state.db.chat_history(user_id)?)).await?;
    Ok(Json(ChatHistoryResponse {
        history: rows.iter().map(chat_entry).collect(),
    }))
}

pub async fn clear(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<StatusCode> {
    let user_id = actor.id();
    let removed = run_blocking(&state, move |state| Ok(state.db.clear_chat_history(user_id)?)).await?;
    info!("Cleared {} chat messages for account {}", removed, user_id);
    Ok(StatusCode::NO_CONTENT)
}

fn chat_entry(row: &ChatRow) -> ChatEntry {
    ChatEntry {
        id: row.id,
        sender: row.sender,
        message: row.message.clone(),
        timestamp: row.created_at,
    }
}
