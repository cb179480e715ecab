use axum::{
    Extension, Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
};
use tracing::info;

use civitas_types::api::{AccountView, ApprovalRequest, ApprovalResponse};

use crate::auth::{AppState, account_view};
use crate::error::{ApiError, ApiResult};
use crate::middleware::Actor;
use crate::run_blocking;

/// Pending authorities, oldest registration first.
pub async fn list_pending(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<AccountView>>> {
    actor.require_admin()?;

    let pending = run_blocking(&state, |state| Ok(state.db.list_pending_authorities()?)).await?;
    Ok(Json(pending.iter().map(account_view).collect()))
}

/// Approve (`approve: true`) or reject (`approve: false`, deletes the account).
pub async fn decide(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<ApprovalRequest>, JsonRejection>,
) -> ApiResult<Json<ApprovalResponse>> {
    let Path(id) = path?;
    actor.require_admin()?;
    let Json(req) = body?;

    let admin_id = actor.id();
    let approved = req.approve;
    resolve(&state, admin_id, id, approved).await?;

    let message = if approved {
        "Authority approved"
    } else {
        "Authority rejected and removed"
    };
    Ok(Json(ApprovalResponse {
        id,
        approved,
        message: message.into(),
    }))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = path?;
    actor.require_admin()?;
    resolve(&state, actor.id(), id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resolve(state: &AppState, admin_id: i64, id: i64, approve: bool) -> ApiResult<()> {
    let resolved = run_blocking(state, move |state| {
        Ok(if approve {
            state.db.approve_authority(id)?
        } else {
            state.db.reject_authority(id)?
        })
    })
    .await?;

    if !resolved {
        return Err(ApiError::NotFound(format!("no pending authority with id {}", id)));
    }
    info!(
        "Admin {} {} authority {}",
        admin_id,
        if approve { "approved" } else { "rejected" },
        id
    );
    Ok(())
}
