//! HTTP surface of civitas: handlers, bearer auth and the collaborators
//! (credential hashing, response generation) they depend on.

pub mod admin;
pub mod announcements;
pub mod assistant;
pub mod auth;
pub mod bootstrap;
pub mod chat;
pub mod credentials;
pub mod error;
pub mod feedback;
pub mod insights;
pub mod middleware;
pub mod validation;

use axum::{
    Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};

use civitas_types::api::HealthResponse;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiResult;
use crate::middleware::require_auth;

/// All routes, with auth applied to everything except registration,
/// login and health. Layers such as CORS and tracing belong to the caller.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register/citizen", post(auth::register_citizen))
        .route("/api/auth/register/authority", post(auth::register_authority))
        .route("/api/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me).patch(auth::update_me))
        .route("/api/auth/admin/authorities/pending", get(admin::list_pending))
        .route("/api/auth/admin/authorities/{id}/approve", patch(admin::decide))
        .route("/api/auth/admin/authorities/{id}", delete(admin::reject))
        .route("/api/feedback/submit", post(feedback::submit))
        .route("/api/feedback/my", get(feedback::list_mine))
        .route("/api/feedback/manage", get(feedback::list_managed))
        .route("/api/feedback/{id}", patch(feedback::update))
        .route("/api/announcements", get(announcements::list).post(announcements::publish))
        .route("/api/announcements/{id}", delete(announcements::delete))
        .route("/api/chat/ask", post(chat::ask))
        .route("/api/chat/history", get(chat::history).delete(chat::clear))
        .route("/api/eco-tips/generate", get(insights::eco_tip))
        .route("/api/policy/summarize", post(insights::summarize_policy))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    run_blocking(&state, |state| Ok(state.db.ping()?)).await?;
    Ok(Json(HealthResponse {
        status: "ok".into(),
        database: "ok".into(),
    }))
}

/// Run store work off the async runtime. The closure runs to completion even
/// if the request future is dropped, and every mutation inside it is a single
/// transaction, so a disconnect never leaves a partial write behind.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state)).await?
}
