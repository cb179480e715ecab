use rusqlite::{Connection, params};

use crate::models::AnnouncementRow;
use crate::queries::OptionalExt;
use crate::{Database, DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Forbidden,
}

impl Database {
    // -- Announcements --

    pub fn insert_announcement(
        &self,
        author_id: i64,
        title: &str,
        content: &str,
        audience: Option<&str>,
    ) -> Result<AnnouncementRow> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO announcements (title, content, audience, author_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![title, content, audience, author_id],
            )?;
            let id = tx.last_insert_rowid();
            query_announcement(tx, id)?
                .ok_or_else(|| DbError::Corrupt(format!("announcement {} missing after insert", id)))
        })
    }

    /// All announcements, newest first.
    pub fn list_announcements(&self) -> Result<Vec<AnnouncementRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY n.created_at DESC, n.id DESC",
                AnnouncementRow::SELECT
            ))?;
            let rows = stmt
                .query_map([], AnnouncementRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete an announcement if the caller wrote it or moderates.
    pub fn delete_announcement_as(
        &self,
        id: i64,
        caller_id: i64,
        caller_is_moderator: bool,
    ) -> Result<DeleteOutcome> {
        self.with_tx(|tx| {
            let author: Option<Option<i64>> = tx
                .query_row(
                    "SELECT author_id FROM announcements WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(author) = author else {
                return Ok(DeleteOutcome::NotFound);
            };
            if author != Some(caller_id) && !caller_is_moderator {
                return Ok(DeleteOutcome::Forbidden);
            }

            tx.execute("DELETE FROM announcements WHERE id = ?1", [id])?;
            Ok(DeleteOutcome::Deleted)
        })
    }
}

fn query_announcement(conn: &Connection, id: i64) -> Result<Option<AnnouncementRow>> {
    conn.query_row(
        &format!("{} WHERE n.id = ?1", AnnouncementRow::SELECT),
        [id],
        AnnouncementRow::from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAccount;
    use crate::test_support::open_temp;
    use civitas_types::models::Role;

    fn officer(db: &Database, phone: &str, route: &str) -> i64 {
        db.create_account(&NewAccount {
            name: format!("Officer {}", phone),
            phone_number: phone.into(),
            email: None,
            password_hash: "hash".into(),
            address: None,
            department: None,
            position: Some(route.into()),
            feedback_route: Some(route.into()),
            role: Role::Authority,
            is_approved: true,
            is_admin: false,
        })
        .unwrap()
        .id
    }

    #[test]
    fn listing_is_newest_first_with_author_names() {
        let (_dir, db) = open_temp();
        let author = officer(&db, "+15550001", "Public Works Department");

        let first = db.insert_announcement(author, "Road closure", "Main St closed", None).unwrap();
        let second = db
            .insert_announcement(author, "Water notice", "Boil water", Some("Ward 3"))
            .unwrap();

        let listed = db.list_announcements().unwrap();
        assert_eq!(listed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(listed[0].audience.as_deref(), Some("Ward 3"));
        assert_eq!(listed[1].author_name.as_deref(), Some("Officer +15550001"));
    }

    #[test]
    fn only_author_or_moderator_may_delete() {
        let (_dir, db) = open_temp();
        let author = officer(&db, "+15550001", "Public Works Department");
        let other = officer(&db, "+15550002", "Water Supply Department");
        let mayor = officer(&db, "+15550003", "Mayor's Office");

        let a = db.insert_announcement(author, "A", "a", None).unwrap();
        let b = db.insert_announcement(author, "B", "b", None).unwrap();

        assert_eq!(db.delete_announcement_as(a.id, other, false).unwrap(), DeleteOutcome::Forbidden);
        assert!(db.list_announcements().unwrap().iter().any(|row| row.id == a.id));

        assert_eq!(db.delete_announcement_as(a.id, author, false).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(db.delete_announcement_as(b.id, mayor, true).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(db.delete_announcement_as(b.id, mayor, true).unwrap(), DeleteOutcome::NotFound);
        assert!(db.list_announcements().unwrap().is_empty());
    }

    #[test]
    fn announcement_outlives_its_author() {
        let (_dir, db) = open_temp();
        let author = officer(&db, "+15550001", "Public Works Department");
        let row = db.insert_announcement(author, "Notice", "Body", None).unwrap();

        db.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", [author])?;
            Ok(())
        })
        .unwrap();

        let orphan = db
            .list_announcements()
            .unwrap()
            .into_iter()
            .find(|listed| listed.id == row.id)
            .unwrap();
        assert!(orphan.author_id.is_none());
        assert!(orphan.author_name.is_none());
        // Authorless announcements can only go through a moderator.
        assert_eq!(db.delete_announcement_as(row.id, author, false).unwrap(), DeleteOutcome::Forbidden);
    }
}
