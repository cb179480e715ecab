use std::sync::{Arc, OnceLock};

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use civitas_db::Database;
use civitas_db::models::{AccountRow, NewAccount, ProfileChanges};
use civitas_types::api::{
    AccountView, Claims, LoginRequest, LoginResponse, RegisterAuthorityRequest,
    RegisterCitizenRequest, RegisterResponse, UpdateProfileRequest,
};
use civitas_types::models::{Role, TransitionPolicy};

use crate::assistant::{DisabledGenerator, ResponseGenerator};
use crate::credentials::{Argon2Hasher, CredentialHasher};
use crate::error::{ApiError, ApiResult};
use crate::middleware::Actor;
use crate::{run_blocking, validation};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub hasher: Arc<dyn CredentialHasher>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub transition_policy: TransitionPolicy,
    /// Hash verified against when an identifier matches no account, so
    /// unknown identifiers cost the same as wrong passwords.
    pub decoy_hash: OnceLock<String>,
}

impl AppStateInner {
    /// State with day-long tokens, Argon2 hashing, no response generator and
    /// forward-only feedback transitions.
    pub fn new(db: Database, jwt_secret: String) -> Self {
        Self {
            db,
            jwt_secret,
            token_ttl: chrono::Duration::minutes(1440),
            hasher: Arc::new(Argon2Hasher),
            generator: Arc::new(DisabledGenerator),
            transition_policy: TransitionPolicy::default(),
            decoy_hash: OnceLock::new(),
        }
    }

    pub fn decoy_hash(&self) -> &str {
        self.decoy_hash
            .get_or_init(|| self.hasher.hash(DECOY_PASSWORD).unwrap_or_default())
    }
}

const DECOY_PASSWORD: &str = "civitas-decoy-credential";

pub async fn register_citizen(
    State(state): State<AppState>,
    body: Result<Json<RegisterCitizenRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;

    let name = validation::name(&req.name)?;
    let phone_number = validation::phone(&req.phone_number)?;
    let email = validation::optional_email(req.email.as_deref())?;
    validation::password(&req.password)?;
    let address = validation::optional_text(req.address.as_deref());

    let account = run_blocking(&state, move |state| {
        let password_hash = state
            .hasher
            .hash(&req.password)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(state.db.create_account(&NewAccount {
            name,
            phone_number,
            email,
            password_hash,
            address,
            department: None,
            position: None,
            feedback_route: None,
            role: Role::Citizen,
            is_approved: true,
            is_admin: false,
        })?)
    })
    .await?;

    info!("Citizen {} registered", account.id);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: account.id,
            user_type: account.role,
            is_approved: account.is_approved,
            message: "Registration successful".into(),
        }),
    ))
}

/// Authorities start pending; they cannot sign in until an administrator approves.
pub async fn register_authority(
    State(state): State<AppState>,
    body: Result<Json<RegisterAuthorityRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;

    let name = validation::name(&req.name)?;
    let route = validation::route(&req.position)?;
    let phone_number = validation::phone(&req.phone_number)?;
    let email = validation::email(&req.email)?;
    validation::password(&req.password)?;
    let department = validation::optional_text(req.department.as_deref());

    let account = run_blocking(&state, move |state| {
        let password_hash = state
            .hasher
            .hash(&req.password)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(state.db.create_account(&NewAccount {
            name,
            phone_number,
            email: Some(email),
            password_hash,
            address: None,
            department,
            position: Some(route.to_string()),
            feedback_route: Some(route.to_string()),
            role: Role::Authority,
            is_approved: false,
            is_admin: false,
        })?)
    })
    .await?;

    info!("Authority {} registered for {}, awaiting approval", account.id, route);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: account.id,
            user_type: account.role,
            is_approved: account.is_approved,
            message: "Registration received; an administrator must approve this account".into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;

    let identifier = req.identifier.trim().to_string();
    if identifier.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_credentials());
    }
    // Emails are stored lowercased
    let identifier = if identifier.contains('@') {
        identifier.to_lowercase()
    } else {
        identifier
    };

    let account = run_blocking(&state, move |state| {
        let account = match state.db.find_account_by_identifier(&identifier)? {
            Some(account) => state
                .hasher
                .verify(&req.password, &account.password_hash)
                .then_some(account),
            None => {
                state.hasher.verify(&req.password, state.decoy_hash());
                None
            }
        }
        .ok_or_else(ApiError::bad_credentials)?;

        if !account.is_active {
            return Err(ApiError::Authorization("account is disabled".into()));
        }
        if !account.is_cleared() {
            return Err(ApiError::Authorization("account is pending approval".into()));
        }

        state.db.record_login(account.id)?;
        Ok(state.db.get_account_by_id(account.id)?.unwrap_or(account))
    })
    .await?;

    let token = create_token(&state.jwt_secret, account.id, account.role, state.token_ttl)
        .map_err(|e| ApiError::Internal(format!("token signing failed: {}", e)))?;

    info!("Account {} signed in", account.id);
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token,
        user_type: account.role,
        user_data: account_view(&account),
    }))
}

pub async fn me(Extension(actor): Extension<Actor>) -> ApiResult<Json<AccountView>> {
    Ok(Json(account_view(&actor.account)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<Json<AccountView>> {
    let Json(req) = body?;

    let email = match req.email.as_deref().map(str::trim) {
        None => None,
        Some("") if actor.account.role == Role::Authority => {
            return Err(ApiError::Validation("authorities must keep an email address".into()));
        }
        Some("") => Some(None),
        Some(value) => Some(Some(validation::email(value)?)),
    };
    let changes = ProfileChanges {
        name: req.name.as_deref().map(validation::name).transpose()?,
        email,
        address: req.address.as_deref().map(|v| validation::optional_text(Some(v))),
        department: req.department.as_deref().map(|v| validation::optional_text(Some(v))),
    };
    if changes.is_empty() {
        return Err(ApiError::Validation("nothing to update".into()));
    }

    let id = actor.account.id;
    let updated = run_blocking(&state, move |state| {
        state
            .db
            .update_profile(id, &changes)?
            .ok_or_else(|| ApiError::NotFound("account not found".into()))
    })
    .await?;

    Ok(Json(account_view(&updated)))
}

pub fn create_token(
    secret: &str,
    account_id: i64,
    role: Role,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: account_id,
        role,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn account_view(account: &AccountRow) -> AccountView {
    AccountView {
        id: account.id,
        name: account.name.clone(),
        phone_number: account.phone_number.clone(),
        email: account.email.clone(),
        address: account.address.clone(),
        department: account.department.clone(),
        position: account.position.clone(),
        feedback_route: account.feedback_route.clone(),
        user_type: account.role,
        is_active: account.is_active,
        is_approved: account.is_cleared(),
        is_admin: account.is_admin,
        created_at: account.created_at,
        updated_at: account.updated_at,
        last_login: account.last_login,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::credentials::CredentialError;

    /// Plain-text "hashes" that count every verification.
    #[derive(Default)]
    struct CountingHasher {
        verifies: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, password: &str) -> Result<String, CredentialError> {
            Ok(format!("plain:{}", password))
        }

        fn verify(&self, password: &str, stored: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            stored == format!("plain:{}", password)
        }
    }

    async fn attempt(state: &AppState, identifier: &str, password: &str) -> ApiResult<()> {
        let body = Ok(Json(LoginRequest {
            identifier: identifier.into(),
            password: password.into(),
        }));
        login(State(state.clone()), body).await.map(|_| ())
    }

    #[tokio::test]
    async fn unknown_identifier_pays_for_a_verification_too() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("civitas.db")).unwrap();
        db.create_account(&NewAccount {
            name: "Casey".into(),
            phone_number: "+15550001".into(),
            email: None,
            password_hash: "plain:secret-pass".into(),
            address: None,
            department: None,
            position: None,
            feedback_route: None,
            role: Role::Citizen,
            is_approved: true,
            is_admin: false,
        })
        .unwrap();

        let hasher = Arc::new(CountingHasher::default());
        let shared: Arc<dyn CredentialHasher> = hasher.clone();
        let mut inner = AppStateInner::new(db, "test-secret".into());
        inner.hasher = shared;
        let state: AppState = Arc::new(inner);

        let unknown = attempt(&state, "+15559999", "secret-pass").await;
        assert!(matches!(unknown, Err(ApiError::Authentication(_))));
        assert_eq!(hasher.verifies.load(Ordering::SeqCst), 1);

        let wrong = attempt(&state, "+15550001", "not-it").await;
        assert!(matches!(wrong, Err(ApiError::Authentication(_))));
        assert_eq!(hasher.verifies.load(Ordering::SeqCst), 2);

        assert_eq!(unknown.unwrap_err().to_string(), wrong.unwrap_err().to_string());

        assert!(attempt(&state, "+15550001", "secret-pass").await.is_ok());
        assert_eq!(hasher.verifies.load(Ordering::SeqCst), 3);
    }
}
