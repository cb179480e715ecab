use axum::{
    Extension, Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use civitas_db::models::AnnouncementRow;
use civitas_db::queries::DeleteOutcome;
use civitas_types::api::{AnnouncementView, PublishAnnouncementRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::Actor;
use crate::{run_blocking, validation};

pub async fn list(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
) -> ApiResult<Json<Vec<AnnouncementView>>> {
    let rows = run_blocking(&state, |state| Ok(state.db.list_announcements()?)).await?;
    Ok(Json(rows.iter().map(announcement_view).collect()))
}

pub async fn publish(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<PublishAnnouncementRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    actor.require_authority()?;
    let Json(req) = body?;

    let title = validation::required("title", &req.title)?;
    let content = validation::required("content", &req.content)?;
    let audience = validation::optional_text(req.audience.as_deref());

    let author_id = actor.id();
    let row = run_blocking(&state, move |state| {
        Ok(state
            .db
            .insert_announcement(author_id, &title, &content, audience.as_deref())?)
    })
    .await?;

    info!("Authority {} published announcement {}", author_id, row.id);
    Ok((StatusCode::CREATED, Json(announcement_view(&row))))
}

/// Authors may remove their own announcements; the moderator route may remove any.
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = path?;
    let caller_id = actor.id();
    let moderator = actor.is_moderator();

    let outcome = run_blocking(&state, move |state| {
        Ok(state.db.delete_announcement_as(id, caller_id, moderator)?)
    })
    .await?;

    match outcome {
        DeleteOutcome::Deleted => {
            info!("Account {} deleted announcement {}", caller_id, id);
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteOutcome::NotFound => Err(ApiError::NotFound(format!("announcement {} not found", id))),
        DeleteOutcome::Forbidden => Err(ApiError::Authorization(
            "only the author or the Mayor's Office may delete this announcement".into(),
        )),
    }
}

fn announcement_view(row: &AnnouncementRow) -> AnnouncementView {
    AnnouncementView {
        id: row.id,
        title: row.title.clone(),
        content: row.content.clone(),
        audience: row.audience.clone(),
        author_id: row.author_id,
        author_name: row.author_name.clone().unwrap_or_else(|| "Unknown".into()),
        created_at: row.created_at,
    }
}
