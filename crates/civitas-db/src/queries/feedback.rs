use civitas_types::models::{FeedbackStatus, TransitionPolicy};
use rusqlite::{Connection, params};

use crate::models::{FeedbackRow, NewFeedback};
use crate::queries::OptionalExt;
use crate::{Database, DbError, NOW_SQL, Result};

/// Result of an authority's status update.
#[derive(Debug, Clone)]
pub enum FeedbackUpdate {
    Updated(FeedbackRow),
    NotFound,
    /// The record is routed to a different authority.
    RouteMismatch,
    TransitionRejected {
        from: FeedbackStatus,
        to: FeedbackStatus,
    },
}

impl Database {
    // -- Feedback --

    pub fn insert_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackRow> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO feedbacks (user_id, category, message, priority, authority_type, location, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'reported')",
                params![
                    feedback.user_id,
                    feedback.category,
                    feedback.message,
                    feedback.priority.as_str(),
                    feedback.authority_type,
                    feedback.location,
                ],
            )?;
            let id = tx.last_insert_rowid();
            query_feedback(tx, id)?
                .ok_or_else(|| DbError::Corrupt(format!("feedback {} missing after insert", id)))
        })
    }

    /// A citizen's own submissions, newest first.
    pub fn list_feedback_by_citizen(&self, user_id: i64) -> Result<Vec<FeedbackRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE f.user_id = ?1 ORDER BY f.created_at DESC, f.id DESC",
                FeedbackRow::SELECT
            ))?;
            let rows = stmt
                .query_map([user_id], FeedbackRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Records routed to `route`, newest first, optionally narrowed to one status.
    pub fn list_feedback_by_route(
        &self,
        route: &str,
        status: Option<FeedbackStatus>,
    ) -> Result<Vec<FeedbackRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE f.authority_type = ?1 AND (?2 IS NULL OR lower(f.status) = ?2)
                 ORDER BY f.created_at DESC, f.id DESC",
                FeedbackRow::SELECT
            ))?;
            let rows = stmt
                .query_map(
                    params![route, status.map(|s| s.as_str())],
                    FeedbackRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move a record to `status` on behalf of the authority serving
    /// `authority_route`. The route check, the transition check and the write
    /// happen in one transaction so concurrent updates cannot interleave.
    ///
    /// `notes`: `None` keeps the current notes, `Some("")` clears them.
    /// The first authority to act is recorded as the handler.
    pub fn update_feedback_status(
        &self,
        id: i64,
        authority_id: i64,
        authority_route: &str,
        status: FeedbackStatus,
        notes: Option<&str>,
        policy: TransitionPolicy,
    ) -> Result<FeedbackUpdate> {
        self.with_tx(|tx| {
            let Some(current) = query_feedback(tx, id)? else {
                return Ok(FeedbackUpdate::NotFound);
            };
            if current.authority_type.as_deref() != Some(authority_route) {
                return Ok(FeedbackUpdate::RouteMismatch);
            }
            if !policy.allows(current.status, status) {
                return Ok(FeedbackUpdate::TransitionRejected {
                    from: current.status,
                    to: status,
                });
            }

            let notes = match notes {
                None => current.authority_notes,
                Some("") => None,
                Some(text) => Some(text.to_string()),
            };

            tx.execute(
                &format!(
                    "UPDATE feedbacks
                     SET status = ?2, authority_notes = ?3,
                         authority_id = COALESCE(authority_id, ?4), updated_at = {}
                     WHERE id = ?1",
                    NOW_SQL
                ),
                params![id, status.as_str(), notes, authority_id],
            )?;

            let updated = query_feedback(tx, id)?
                .ok_or_else(|| DbError::Corrupt(format!("feedback {} missing after update", id)))?;
            Ok(FeedbackUpdate::Updated(updated))
        })
    }
}

fn query_feedback(conn: &Connection, id: i64) -> Result<Option<FeedbackRow>> {
    conn.query_row(
        &format!("{} WHERE f.id = ?1", FeedbackRow::SELECT),
        [id],
        FeedbackRow::from_row,
    )
    .optional()
}
