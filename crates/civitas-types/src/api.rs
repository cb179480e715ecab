use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatSender, FeedbackStatus, Priority, Role};

// -- JWT Claims --

/// Bearer token claims. `role` is informational only: the server reloads the
/// account on every request and never trusts it for authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterCitizenRequest {
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterAuthorityRequest {
    pub name: String,
    /// Routing label; becomes the account's `feedback_route`.
    pub position: String,
    pub phone_number: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub user_type: Role,
    pub is_approved: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Phone number or email.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user_type: Role,
    pub user_data: AccountView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub feedback_route: Option<String>,
    pub user_type: Role,
    pub is_active: bool,
    pub is_approved: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub department: Option<String>,
}

// -- Admin --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalRequest {
    pub approve: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub id: i64,
    pub approved: bool,
    pub message: String,
}

// -- Feedback --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitFeedbackRequest {
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub authority_type: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackQuery {
    pub status_filter: Option<FeedbackStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFeedbackRequest {
    pub status: FeedbackStatus,
    /// `None` leaves notes untouched; an empty string clears them.
    #[serde(default)]
    pub authority_notes: Option<String>,
}

/// What a citizen sees of their own submission. Authority notes are withheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitizenFeedbackView {
    pub id: i64,
    pub category: String,
    pub message: String,
    pub priority: Option<Priority>,
    pub authority_type: Option<String>,
    pub location: Option<String>,
    pub status: FeedbackStatus,
    pub authority_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedFeedbackView {
    pub id: i64,
    pub category: String,
    pub message: String,
    pub priority: Option<Priority>,
    pub authority_type: Option<String>,
    pub location: Option<String>,
    pub status: FeedbackStatus,
    pub authority_notes: Option<String>,
    pub authority_id: Option<i64>,
    pub authority_name: Option<String>,
    pub citizen_name: String,
    pub citizen_contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Announcements --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishAnnouncementRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementView {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub audience: Option<String>,
    pub author_id: Option<i64>,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatAskRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: i64,
    pub sender: ChatSender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatAskResponse {
    pub response: String,
    pub history: Vec<ChatEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub history: Vec<ChatEntry>,
}

// -- Generated content --

#[derive(Debug, Deserialize)]
pub struct EcoTipQuery {
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EcoTipResponse {
    pub status: String,
    pub topic: String,
    pub tip: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySummaryRequest {
    pub text: String,
    #[serde(default)]
    pub summary_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicySummaryResponse {
    pub status: String,
    pub summary_type: String,
    pub summary: String,
}

// -- Misc --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}
