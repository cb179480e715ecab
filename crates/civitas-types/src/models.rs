use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Route label that carries moderator privileges over announcements.
pub const MODERATOR_ROUTE: &str = "Mayor's Office";

/// Department labels citizens can address feedback to.
pub const FEEDBACK_ROUTES: &[&str] = &[
    MODERATOR_ROUTE,
    "City Council",
    "Public Works Department",
    "Transportation Authority",
    "Environmental Services",
    "Health & Safety Department",
    "Housing & Urban Development",
];

pub const FEEDBACK_CATEGORIES: &[&str] = &[
    "Environmental Issues",
    "Public Transportation",
    "Waste Management",
    "Water Quality",
    "Energy Efficiency",
    "Urban Planning",
    "Public Health",
    "Education",
    "Economic Development",
    "Other",
];

/// Resolve user input to the canonical route label (trimmed, case-insensitive).
pub fn canonical_route(input: &str) -> Option<&'static str> {
    let needle = input.trim();
    FEEDBACK_ROUTES
        .iter()
        .copied()
        .find(|route| route.eq_ignore_ascii_case(needle))
}

pub fn canonical_category(input: &str) -> Option<&'static str> {
    let needle = input.trim();
    FEEDBACK_CATEGORIES
        .iter()
        .copied()
        .find(|category| category.eq_ignore_ascii_case(needle))
}

pub fn is_moderator_route(route: &str) -> bool {
    route.trim().eq_ignore_ascii_case(MODERATOR_ROUTE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Citizen,
    Authority,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Authority => "authority",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    /// Older deployments stored citizens as `user` / `USER`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "citizen" | "user" => Ok(Role::Citizen),
            "authority" => Ok(Role::Authority),
            _ => Err(UnknownVariant {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

// -- Feedback --

/// Feedback lifecycle, ordered `reported -> in_process -> solved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Reported,
    InProcess,
    Solved,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Reported => "reported",
            FeedbackStatus::InProcess => "in_process",
            FeedbackStatus::Solved => "solved",
        }
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reported" => Ok(FeedbackStatus::Reported),
            "in_process" => Ok(FeedbackStatus::InProcess),
            "solved" => Ok(FeedbackStatus::Solved),
            _ => Err(UnknownVariant {
                kind: "feedback status",
                value: s.to_string(),
            }),
        }
    }
}

/// Which status moves an authority may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Status may stay put or advance; never move back.
    #[default]
    ForwardOnly,
    /// Any status may follow any other (reopening solved cases).
    AllowReopen,
}

impl TransitionPolicy {
    pub fn allows(&self, from: FeedbackStatus, to: FeedbackStatus) -> bool {
        match self {
            TransitionPolicy::ForwardOnly => to >= from,
            TransitionPolicy::AllowReopen => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(UnknownVariant {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

// -- Chat --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    User,
    Assistant,
}

impl ChatSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatSender::User => "user",
            ChatSender::Assistant => "assistant",
        }
    }
}

impl FromStr for ChatSender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatSender::User),
            "assistant" => Ok(ChatSender::Assistant),
            _ => Err(UnknownVariant {
                kind: "chat sender",
                value: s.to_string(),
            }),
        }
    }
}
