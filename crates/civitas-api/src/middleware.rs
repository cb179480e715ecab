use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use civitas_db::models::AccountRow;
use civitas_types::api::Claims;
use civitas_types::models::{Role, is_moderator_route};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::run_blocking;

/// The authenticated caller, freshly loaded from the store for this request.
#[derive(Debug, Clone)]
pub struct Actor {
    pub account: AccountRow,
}

impl Actor {
    pub fn id(&self) -> i64 {
        self.account.id
    }

    pub fn require_citizen(&self) -> ApiResult<()> {
        match self.account.role {
            Role::Citizen => Ok(()),
            Role::Authority => Err(ApiError::Authorization("citizens only".into())),
        }
    }

    /// The authority's route label, or an authorization failure.
    pub fn require_authority(&self) -> ApiResult<&str> {
        match (self.account.role, self.account.feedback_route.as_deref()) {
            (Role::Authority, Some(route)) => Ok(route),
            (Role::Authority, None) => Err(ApiError::Authorization(
                "authority account has no department assigned".into(),
            )),
            (Role::Citizen, _) => Err(ApiError::Authorization("authorities only".into())),
        }
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.account.is_admin {
            Ok(())
        } else {
            Err(ApiError::Authorization("administrator privileges required".into()))
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.account.role == Role::Authority
            && self
                .account
                .feedback_route
                .as_deref()
                .is_some_and(is_moderator_route)
    }
}

/// Validate the bearer token, reload the account it names and insert an
/// [`Actor`]. The role claimed in the token is ignored; disabled and pending
/// accounts are turned away here.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Authentication("missing bearer token".into()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Authentication("invalid or expired token".into()))?;

    let account_id = token_data.claims.sub;
    let account = run_blocking(&state, move |state| Ok(state.db.get_account_by_id(account_id)?))
        .await?
        .ok_or_else(|| ApiError::Authentication("invalid or expired token".into()))?;

    if !account.is_active {
        return Err(ApiError::Authorization("account is disabled".into()));
    }
    if !account.is_cleared() {
        return Err(ApiError::Authorization("account is pending approval".into()));
    }

    req.extensions_mut().insert(Actor { account });
    Ok(next.run(req).await)
}
