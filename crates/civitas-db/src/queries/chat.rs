use civitas_types::models::ChatSender;
use rusqlite::{Connection, params};

use crate::models::ChatRow;
use crate::{Database, Result};

impl Database {
    // -- Chat log --

    /// Append a question and its answer as one unit. Either both rows land or
    /// neither does.
    pub fn append_chat_exchange(
        &self,
        user_id: i64,
        question: &str,
        answer: &str,
    ) -> Result<Vec<ChatRow>> {
        self.with_tx(|tx| {
            insert_chat(tx, user_id, ChatSender::User, question)?;
            insert_chat(tx, user_id, ChatSender::Assistant, answer)?;
            query_history(tx, user_id)
        })
    }

    /// Full history for one user, oldest first.
    pub fn chat_history(&self, user_id: i64) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| query_history(conn, user_id))
    }

    /// The last `limit` messages for one user, still oldest first.
    pub fn recent_chat(&self, user_id: i64, limit: usize) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM (
                     SELECT {} FROM chat_messages WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
                ChatRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![user_id, limit as i64], ChatRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Remove every message for one user. Returns how many were removed.
    pub fn clear_chat_history(&self, user_id: i64) -> Result<usize> {
        self.with_tx(|tx| Ok(tx.execute("DELETE FROM chat_messages WHERE user_id = ?1", [user_id])?))
    }
}

fn insert_chat(conn: &Connection, user_id: i64, sender: ChatSender, message: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO chat_messages (user_id, sender, message) VALUES (?1, ?2, ?3)",
        params![user_id, sender.as_str(), message],
    )?;
    Ok(())
}

fn query_history(conn: &Connection, user_id: i64) -> Result<Vec<ChatRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM chat_messages WHERE user_id = ?1 ORDER BY id ASC",
        ChatRow::COLUMNS
    ))?;
    let rows = stmt
        .query_map([user_id], ChatRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
