use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, PathRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use civitas_db::models::{FeedbackRow, NewFeedback};
use civitas_db::queries::FeedbackUpdate;
use civitas_types::api::{
    CitizenFeedbackView, FeedbackQuery, ManagedFeedbackView, SubmitFeedbackRequest,
    UpdateFeedbackRequest,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::Actor;
use crate::{run_blocking, validation};

pub async fn submit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<SubmitFeedbackRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    actor.require_citizen()?;
    let Json(req) = body?;

    let feedback = NewFeedback {
        user_id: actor.id(),
        category: validation::category(&req.category)?.to_string(),
        message: validation::required("message", &req.message)?,
        priority: req.priority.unwrap_or_default(),
        authority_type: validation::route(&req.authority_type)?.to_string(),
        location: validation::optional_text(req.location.as_deref()),
    };

    let row = run_blocking(&state, move |state| Ok(state.db.insert_feedback(&feedback)?)).await?;

    info!("Feedback {} submitted to {}", row.id, row.authority_type.as_deref().unwrap_or("-"));
    Ok((StatusCode::CREATED, Json(citizen_view(&row))))
}

/// The caller's own submissions, newest first.
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<CitizenFeedbackView>>> {
    actor.require_citizen()?;

    let user_id = actor.id();
    let rows = run_blocking(&state, move |state| Ok(state.db.list_feedback_by_citizen(user_id)?)).await?;
    Ok(Json(rows.iter().map(citizen_view).collect()))
}

/// Records routed to the caller's department, newest first.
pub async fn list_managed(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<FeedbackQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ManagedFeedbackView>>> {
    let route = actor.require_authority()?.to_string();
    let Query(query) = query?;

    let rows = run_blocking(&state, move |state| {
        Ok(state.db.list_feedback_by_route(&route, query.status_filter)?)
    })
    .await?;
    Ok(Json(rows.iter().map(managed_view).collect()))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateFeedbackRequest>, JsonRejection>,
) -> ApiResult<Json<ManagedFeedbackView>> {
    let Path(id) = path?;
    let route = actor.require_authority()?.to_string();
    let Json(req) = body?;

    let authority_id = actor.id();
    let status = req.status;
    let outcome = run_blocking(&state, move |state| {
        let notes = req.authority_notes.as_deref().map(str::trim);
        Ok(state.db.update_feedback_status(
            id,
            authority_id,
            &route,
            status,
            notes,
            state.transition_policy,
        )?)
    })
    .await?;

    match outcome {
        FeedbackUpdate::Updated(row) => {
            info!("Authority {} moved feedback {} to {}", authority_id, id, status);
            Ok(Json(managed_view(&row)))
        }
        FeedbackUpdate::NotFound => Err(ApiError::NotFound(format!("feedback {} not found", id))),
        FeedbackUpdate::RouteMismatch => Err(ApiError::Authorization(
            "feedback is routed to a different department".into(),
        )),
        FeedbackUpdate::TransitionRejected { from, to } => Err(ApiError::Validation(format!(
            "status cannot move from {} back to {}",
            from, to
        ))),
    }
}

/// Citizens never see authority notes.
fn citizen_view(row: &FeedbackRow) -> CitizenFeedbackView {
    CitizenFeedbackView {
        id: row.id,
        category: row.category.clone(),
        message: row.message.clone(),
        priority: row.priority,
        authority_type: row.authority_type.clone(),
        location: row.location.clone(),
        status: row.status,
        authority_name: row.authority_name.clone(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn managed_view(row: &FeedbackRow) -> ManagedFeedbackView {
    ManagedFeedbackView {
        id: row.id,
        category: row.category.clone(),
        message: row.message.clone(),
        priority: row.priority,
        authority_type: row.authority_type.clone(),
        location: row.location.clone(),
        status: row.status,
        authority_notes: row.authority_notes.clone(),
        authority_id: row.authority_id,
        authority_name: row.authority_name.clone(),
        citizen_name: row.citizen_name.clone().unwrap_or_else(|| "unknown".into()),
        citizen_contact: row.citizen_phone.clone(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
