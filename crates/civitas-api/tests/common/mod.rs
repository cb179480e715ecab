#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use civitas_api::assistant::{ChatTurn, GenerationError, ResponseGenerator};
use civitas_api::auth::{AppState, AppStateInner};
use civitas_api::bootstrap::{SeedAdmin, seed_admin};
use civitas_api::credentials::Argon2Hasher;
use civitas_db::Database;
use civitas_types::models::TransitionPolicy;

pub const ADMIN_PHONE: &str = "+10000000000";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const PASSWORD: &str = "secret-pass";

/// Echoes the prompt back with the number of context turns it was given.
#[derive(Default)]
pub struct FakeGenerator {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ResponseGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str, context: &[ChatTurn]) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Status(503));
        }
        Ok(format!("echo[{}]: {}", context.len(), prompt))
    }
}

pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub generator: Arc<FakeGenerator>,
    _dir: TempDir,
}

pub async fn spawn() -> TestServer {
    spawn_with(TransitionPolicy::ForwardOnly).await
}

pub async fn spawn_with(policy: TransitionPolicy) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("civitas.db")).unwrap();
    seed_admin(
        &db,
        &Argon2Hasher,
        &SeedAdmin {
            name: "City Administrator".into(),
            phone_number: ADMIN_PHONE.into(),
            email: "admin@civitas.local".into(),
            password: Some(ADMIN_PASSWORD.into()),
            credential_file: dir.path().join("admin.txt"),
        },
    )
    .unwrap();

    let generator = Arc::new(FakeGenerator::default());
    let shared: Arc<dyn ResponseGenerator> = generator.clone();
    let mut inner = AppStateInner::new(db, "test-secret".into());
    inner.generator = shared;
    inner.transition_policy = policy;
    let state: AppState = Arc::new(inner);

    let app = civitas_api::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        state,
        generator,
        _dir: dir,
    }
}

impl TestServer {
    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self.client.request(method, format!("{}{}", self.base, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        let text = response.text().await.unwrap();
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, value)
    }

    pub async fn get(&self, path: &str, token: &str) -> (u16, Value) {
        self.send(reqwest::Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, token, Some(body)).await
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PATCH, path, Some(token), Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> (u16, Value) {
        self.send(reqwest::Method::DELETE, path, Some(token), None).await
    }

    pub async fn register_citizen(&self, phone: &str, email: Option<&str>) -> (u16, Value) {
        let mut body = json!({
            "name": "Casey Citizen",
            "phone_number": phone,
            "password": PASSWORD,
        });
        if let Some(email) = email {
            body["email"] = json!(email);
        }
        self.post("/api/auth/register/citizen", None, body).await
    }

    pub async fn register_authority(&self, phone: &str, email: &str, route: &str) -> (u16, Value) {
        self.post(
            "/api/auth/register/authority",
            None,
            json!({
                "name": "Avery Authority",
                "position": route,
                "phone_number": phone,
                "email": email,
                "password": PASSWORD,
            }),
        )
        .await
    }

    pub async fn login(&self, identifier: &str, password: &str) -> (u16, Value) {
        self.post(
            "/api/auth/login",
            None,
            json!({ "identifier": identifier, "password": password }),
        )
        .await
    }

    pub async fn token(&self, identifier: &str, password: &str) -> String {
        let (status, body) = self.login(identifier, password).await;
        assert_eq!(status, 200, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.token(ADMIN_PHONE, ADMIN_PASSWORD).await
    }

    /// Register a citizen and return (id, token).
    pub async fn citizen(&self, phone: &str) -> (i64, String) {
        let (status, body) = self.register_citizen(phone, None).await;
        assert_eq!(status, 201, "{}", body);
        (body["id"].as_i64().unwrap(), self.token(phone, PASSWORD).await)
    }

    /// Register and approve an authority on `route`; returns (id, token).
    pub async fn approved_authority(&self, phone: &str, email: &str, route: &str) -> (i64, String) {
        let (status, body) = self.register_authority(phone, email, route).await;
        assert_eq!(status, 201, "{}", body);
        let id = body["id"].as_i64().unwrap();

        let admin = self.admin_token().await;
        let (status, _) = self
            .patch(
                &format!("/api/auth/admin/authorities/{}/approve", id),
                &admin,
                json!({ "approve": true }),
            )
            .await;
        assert_eq!(status, 200);
        (id, self.token(phone, PASSWORD).await)
    }
}
