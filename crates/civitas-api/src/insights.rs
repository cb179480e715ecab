//! Eco tips and policy summaries: stateless pass-throughs to the generator.

use axum::{
    Extension, Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
};
use tracing::warn;

use civitas_types::api::{EcoTipQuery, EcoTipResponse, PolicySummaryRequest, PolicySummaryResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::Actor;
use crate::validation;

const DEFAULT_SUMMARY: &str = "brief";

pub async fn eco_tip(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    query: Result<Query<EcoTipQuery>, QueryRejection>,
) -> ApiResult<Json<EcoTipResponse>> {
    let Query(query) = query?;
    let topic = validation::required("topic", &query.topic)?;

    let prompt = format!(
        "Give one practical, specific eco-friendly tip about {} that a city resident can act on today.",
        topic
    );
    let tip = state.generator.generate(&prompt, &[]).await.map_err(|e| {
        warn!("Eco tip generation failed: {}", e);
        ApiError::Upstream(e.to_string())
    })?;

    Ok(Json(EcoTipResponse {
        status: "success".into(),
        topic,
        tip,
    }))
}

pub async fn summarize_policy(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    body: Result<Json<PolicySummaryRequest>, JsonRejection>,
) -> ApiResult<Json<PolicySummaryResponse>> {
    let Json(req) = body?;
    let text = validation::required("text", &req.text)?;
    let summary_type = validation::optional_text(req.summary_type.as_deref())
        .unwrap_or_else(|| DEFAULT_SUMMARY.into());

    let prompt = format!(
        "Summarize the following municipal policy for citizens as a {} summary, \
         in plain language with the key points first.\n\n{}",
        summary_type, text
    );
    let summary = state.generator.generate(&prompt, &[]).await.map_err(|e| {
        warn!("Policy summary generation failed: {}", e);
        ApiError::Upstream(e.to_string())
    })?;

    Ok(Json(PolicySummaryResponse {
        status: "success".into(),
        summary_type,
        summary,
    }))
}
