use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use axum::http::HeaderValue;

use civitas_api::bootstrap::SeedAdmin;
use civitas_api::credentials::generate_secret;
use civitas_db::PoolConfig;
use civitas_types::models::TransitionPolicy;

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "your-secret-key-here",
];

#[derive(Debug, Clone)]
pub enum CorsOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub pool: PoolConfig,
    pub jwt_secret: String,
    /// True when no secret was configured and a random one was made up.
    pub jwt_secret_ephemeral: bool,
    pub token_ttl: chrono::Duration,
    pub cors: CorsOrigins,
    pub transition_policy: TransitionPolicy,
    pub admin: SeedAdmin,
    pub assistant: Option<AssistantConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let (jwt_secret, jwt_secret_ephemeral) = match var("CIVITAS_JWT_SECRET") {
            Some(secret) if PLACEHOLDER_SECRETS.contains(&secret.as_str()) => {
                bail!("CIVITAS_JWT_SECRET is still a placeholder; set a real secret");
            }
            Some(secret) => (secret, false),
            None => (generate_secret(48), true),
        };

        let cors = match var("CIVITAS_CORS_ORIGINS").as_deref() {
            Some("*") => CorsOrigins::Any,
            raw => {
                let raw = raw.unwrap_or("http://localhost:8501,http://127.0.0.1:8501");
                let origins = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(|o| {
                        HeaderValue::from_str(o)
                            .with_context(|| format!("invalid origin in CIVITAS_CORS_ORIGINS: {}", o))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                CorsOrigins::List(origins)
            }
        };

        let transition_policy = if parse_or(&var, "CIVITAS_ALLOW_STATUS_REOPEN", false)? {
            TransitionPolicy::AllowReopen
        } else {
            TransitionPolicy::ForwardOnly
        };

        let assistant = match var("CIVITAS_ASSISTANT_URL") {
            Some(url) => Some(AssistantConfig {
                url,
                api_key: var("CIVITAS_ASSISTANT_API_KEY"),
                timeout: Duration::from_secs(parse_or(&var, "CIVITAS_ASSISTANT_TIMEOUT_SECS", 30)?),
            }),
            None => None,
        };

        Ok(Self {
            host: var("CIVITAS_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse_or(&var, "CIVITAS_PORT", 8000)?,
            db_path: var("CIVITAS_DB_PATH").unwrap_or_else(|| "civitas.db".into()).into(),
            pool: PoolConfig {
                max_connections: parse_or(&var, "CIVITAS_DB_POOL_SIZE", 8)?,
                acquire_timeout: Duration::from_millis(parse_or(&var, "CIVITAS_DB_ACQUIRE_TIMEOUT_MS", 2000)?),
                idle_recycle: Duration::from_secs(parse_or(&var, "CIVITAS_DB_IDLE_RECYCLE_SECS", 1800)?),
            },
            jwt_secret,
            jwt_secret_ephemeral,
            token_ttl: chrono::Duration::minutes(parse_or(&var, "CIVITAS_JWT_EXPIRE_MINUTES", 1440)?),
            cors,
            transition_policy,
            admin: SeedAdmin {
                name: var("CIVITAS_ADMIN_NAME").unwrap_or_else(|| "City Administrator".into()),
                phone_number: var("CIVITAS_ADMIN_PHONE").unwrap_or_else(|| "+10000000000".into()),
                email: var("CIVITAS_ADMIN_EMAIL").unwrap_or_else(|| "admin@civitas.local".into()),
                password: var("CIVITAS_ADMIN_PASSWORD"),
                credential_file: var("CIVITAS_ADMIN_CREDENTIAL_FILE")
                    .unwrap_or_else(|| "civitas-admin.txt".into())
                    .into(),
            },
            assistant,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
