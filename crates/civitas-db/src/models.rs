//! Database row types. These map directly to SQLite rows.
//! Distinct from civitas-types API views to keep the DB layer independent.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use civitas_types::models::{ChatSender, FeedbackStatus, Priority, Role};
use rusqlite::Row;
use rusqlite::types::Type;

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub address: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub feedback_route: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_approved: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl AccountRow {
    /// Citizens are implicitly approved; authorities need the flag.
    pub fn is_cleared(&self) -> bool {
        match self.role {
            Role::Citizen => true,
            Role::Authority => self.is_approved,
        }
    }

    pub(crate) const COLUMNS: &'static str = "id, name, phone_number, email, password_hash, address, \
         department, position, feedback_route, user_type, is_active, is_approved, is_admin, \
         created_at, COALESCE(updated_at, created_at), last_login";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            phone_number: row.get(2)?,
            email: row.get(3)?,
            password_hash: row.get(4)?,
            address: row.get(5)?,
            department: row.get(6)?,
            position: row.get(7)?,
            feedback_route: row.get(8)?,
            role: parsed(row, 9)?,
            is_active: row.get(10)?,
            is_approved: row.get(11)?,
            is_admin: row.get(12)?,
            created_at: timestamp(row, 13)?,
            updated_at: timestamp(row, 14)?,
            last_login: optional_timestamp(row, 15)?,
        })
    }
}

/// Insert payload for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub address: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub feedback_route: Option<String>,
    pub role: Role,
    pub is_approved: bool,
    pub is_admin: bool,
}

/// Profile edits. For nullable columns, `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub department: Option<Option<String>>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.department.is_none()
    }
}

/// A feedback record joined with the display names of the people it references.
#[derive(Debug, Clone)]
pub struct FeedbackRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub authority_id: Option<i64>,
    pub category: String,
    pub message: String,
    pub authority_type: Option<String>,
    pub priority: Option<Priority>,
    pub location: Option<String>,
    pub status: FeedbackStatus,
    pub authority_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub citizen_name: Option<String>,
    pub citizen_phone: Option<String>,
    pub authority_name: Option<String>,
}

impl FeedbackRow {
    pub(crate) const SELECT: &'static str = "SELECT f.id, f.user_id, f.authority_id, f.category, \
         f.message, f.authority_type, f.priority, f.location, f.status, f.authority_notes, \
         f.created_at, COALESCE(f.updated_at, f.created_at), c.name, c.phone_number, a.name \
         FROM feedbacks f \
         LEFT JOIN users c ON f.user_id = c.id \
         LEFT JOIN users a ON f.authority_id = a.id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            authority_id: row.get(2)?,
            category: row.get(3)?,
            message: row.get(4)?,
            authority_type: row.get(5)?,
            // Legacy rows may carry free-form priorities; those read as unset.
            priority: row
                .get::<_, Option<String>>(6)?
                .and_then(|value| value.parse().ok()),
            location: row.get(7)?,
            status: parsed(row, 8)?,
            authority_notes: row.get(9)?,
            created_at: timestamp(row, 10)?,
            updated_at: timestamp(row, 11)?,
            citizen_name: row.get(12)?,
            citizen_phone: row.get(13)?,
            authority_name: row.get(14)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub user_id: i64,
    pub category: String,
    pub message: String,
    pub priority: Priority,
    pub authority_type: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnnouncementRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub audience: Option<String>,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnnouncementRow {
    pub(crate) const SELECT: &'static str = "SELECT n.id, n.title, n.content, n.audience, \
         n.author_id, u.name, n.created_at \
         FROM announcements n \
         LEFT JOIN users u ON n.author_id = u.id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            audience: row.get(3)?,
            author_id: row.get(4)?,
            author_name: row.get(5)?,
            created_at: timestamp(row, 6)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: i64,
    pub user_id: i64,
    pub sender: ChatSender,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ChatRow {
    pub(crate) const COLUMNS: &'static str = "id, user_id, sender, message, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            sender: parsed(row, 2)?,
            message: row.get(3)?,
            created_at: timestamp(row, 4)?,
        })
    }
}

/// Parse a stored timestamp. SQLite stores "YYYY-MM-DD HH:MM:SS[.fff]"
/// without timezone (UTC); RFC 3339 values from older writers are accepted too.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        parse_timestamp(&value)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let fractional = parse_timestamp("2025-03-01 10:15:30.250").unwrap();
        assert_eq!(fractional.nanosecond(), 250_000_000);

        let whole = parse_timestamp("2025-03-01 10:15:30").unwrap();
        assert_eq!(whole.second(), 30);

        let rfc = parse_timestamp("2025-03-01T10:15:30+02:00").unwrap();
        assert_eq!(rfc.hour(), 8);

        assert!(parse_timestamp("yesterday").is_err());
    }
}
