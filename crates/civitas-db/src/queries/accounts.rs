use rusqlite::{Connection, params};

use crate::models::{AccountRow, NewAccount, ProfileChanges};
use crate::queries::OptionalExt;
use crate::{Database, DbError, NOW_SQL, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    AlreadyPresent,
    Created(i64),
}

impl Database {
    // -- Accounts --

    /// Insert an account. Duplicate phone or email surfaces as
    /// [`DbError::Conflict`] from the unique indexes, including under races.
    pub fn create_account(&self, account: &NewAccount) -> Result<AccountRow> {
        self.with_tx(|tx| {
            let id = insert_account(tx, account)?;
            query_account(tx, id)?
                .ok_or_else(|| DbError::Corrupt(format!("account {} missing after insert", id)))
        })
    }

    pub fn get_account_by_id(&self, id: i64) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, id))
    }

    /// Look an account up by phone number or email.
    pub fn find_account_by_identifier(&self, identifier: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM users WHERE phone_number = ?1 OR email = ?1 ORDER BY id LIMIT 1",
                    AccountRow::COLUMNS
                ),
                [identifier],
                AccountRow::from_row,
            )
            .optional()
        })
    }

    pub fn record_login(&self, id: i64) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                &format!(
                    "UPDATE users SET last_login = {now}, updated_at = {now} WHERE id = ?1",
                    now = NOW_SQL
                ),
                [id],
            )?;
            Ok(())
        })
    }

    /// Apply profile edits as one read-modify-write. `Ok(None)` if the account is gone.
    pub fn update_profile(&self, id: i64, changes: &ProfileChanges) -> Result<Option<AccountRow>> {
        self.with_tx(|tx| {
            let Some(current) = query_account(tx, id)? else {
                return Ok(None);
            };

            let name = changes.name.clone().unwrap_or(current.name);
            let email = changes.email.clone().unwrap_or(current.email);
            let address = changes.address.clone().unwrap_or(current.address);
            let department = changes.department.clone().unwrap_or(current.department);

            tx.execute(
                &format!(
                    "UPDATE users SET name = ?2, email = ?3, address = ?4, department = ?5, \
                     updated_at = {} WHERE id = ?1",
                    NOW_SQL
                ),
                params![id, name, email, address, department],
            )?;

            query_account(tx, id)
        })
    }

    // -- Approval queue --

    /// Authorities awaiting approval, oldest first.
    pub fn list_pending_authorities(&self) -> Result<Vec<AccountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users
                 WHERE lower(user_type) = 'authority' AND is_approved = 0
                 ORDER BY created_at ASC, id ASC",
                AccountRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map([], AccountRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip a pending authority to approved. Returns false when there is no
    /// pending authority with that id (missing, a citizen, or already approved).
    pub fn approve_authority(&self, id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                &format!(
                    "UPDATE users SET is_approved = 1, updated_at = {}
                     WHERE id = ?1 AND lower(user_type) = 'authority' AND is_approved = 0",
                    NOW_SQL
                ),
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete a pending authority outright. Same `false` cases as approval.
    pub fn reject_authority(&self, id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "DELETE FROM users
                 WHERE id = ?1 AND lower(user_type) = 'authority' AND is_approved = 0",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Bootstrap --

    pub fn admin_exists(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE is_admin = 1 LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Create `admin` unless some administrator already exists. Safe to call
    /// on every startup.
    pub fn ensure_seed_admin(&self, admin: &NewAccount) -> Result<SeedOutcome> {
        self.with_tx(|tx| {
            let existing: Option<i64> = tx
                .query_row("SELECT id FROM users WHERE is_admin = 1 LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;
            if existing.is_some() {
                return Ok(SeedOutcome::AlreadyPresent);
            }

            let seeded = NewAccount {
                is_admin: true,
                is_approved: true,
                ..admin.clone()
            };
            Ok(SeedOutcome::Created(insert_account(tx, &seeded)?))
        })
    }
}

fn insert_account(conn: &Connection, account: &NewAccount) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (name, phone_number, email, password_hash, address, department,
                            position, feedback_route, user_type, is_approved, is_admin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            account.name,
            account.phone_number,
            account.email,
            account.password_hash,
            account.address,
            account.department,
            account.position,
            account.feedback_route,
            account.role.as_str(),
            account.is_approved,
            account.is_admin,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn query_account(conn: &Connection, id: i64) -> Result<Option<AccountRow>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", AccountRow::COLUMNS),
        [id],
        AccountRow::from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_temp;
    use civitas_types::models::Role;
    use std::sync::{Arc, Barrier};

    fn citizen(phone: &str, email: Option<&str>) -> NewAccount {
        NewAccount {
            name: "Citizen".into(),
            phone_number: phone.into(),
            email: email.map(str::to_string),
            password_hash: "hash".into(),
            address: None,
            department: None,
            position: None,
            feedback_route: None,
            role: Role::Citizen,
            is_approved: true,
            is_admin: false,
        }
    }

    fn authority(phone: &str, email: &str) -> NewAccount {
        NewAccount {
            name: "Officer".into(),
            position: Some("Public Works Department".into()),
            feedback_route: Some("Public Works Department".into()),
            role: Role::Authority,
            is_approved: false,
            ..citizen(phone, Some(email))
        }
    }

    #[test]
    fn duplicate_phone_is_a_conflict_and_first_account_survives() {
        let (_dir, db) = open_temp();
        let first = db.create_account(&citizen("+15550001", None)).unwrap();

        let err = db.create_account(&citizen("+15550001", Some("x@y.org"))).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(err.conflicting_column(), Some("phone_number"));

        let still_there = db.get_account_by_id(first.id).unwrap().unwrap();
        assert_eq!(still_there.phone_number, "+15550001");
        assert_eq!(still_there.email, None);
    }

    #[test]
    fn duplicate_email_is_a_conflict_but_missing_emails_are_not() {
        let (_dir, db) = open_temp();
        db.create_account(&citizen("+15550001", None)).unwrap();
        db.create_account(&citizen("+15550002", None)).unwrap();
        db.create_account(&citizen("+15550003", Some("a@city.gov"))).unwrap();

        let err = db.create_account(&citizen("+15550004", Some("a@city.gov"))).unwrap_err();
        assert_eq!(err.conflicting_column(), Some("email"));
    }

    #[test]
    fn racing_registrations_yield_exactly_one_account() {
        let (_dir, db) = open_temp();
        let db = Arc::new(db);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["+15550010", "+15550011"]
            .into_iter()
            .map(|phone| {
                let db = db.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    db.create_account(&citizen(phone, Some("same@city.gov")))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(DbError::Conflict(_))))
            .count();
        assert_eq!((ok, conflicts), (1, 1));
    }

    #[test]
    fn identifier_matches_phone_or_email() {
        let (_dir, db) = open_temp();
        let created = db.create_account(&citizen("+15550001", Some("me@city.gov"))).unwrap();

        let by_phone = db.find_account_by_identifier("+15550001").unwrap().unwrap();
        let by_email = db.find_account_by_identifier("me@city.gov").unwrap().unwrap();
        assert_eq!(by_phone.id, created.id);
        assert_eq!(by_email.id, created.id);
        assert!(db.find_account_by_identifier("nobody").unwrap().is_none());
    }

    #[test]
    fn pending_queue_is_oldest_first_and_resolves_once() {
        let (_dir, db) = open_temp();
        let first = db.create_account(&authority("+15550021", "a@city.gov")).unwrap();
        let second = db.create_account(&authority("+15550022", "b@city.gov")).unwrap();
        let third = db.create_account(&authority("+15550023", "c@city.gov")).unwrap();
        db.create_account(&citizen("+15550024", None)).unwrap();

        let queue: Vec<i64> = db
            .list_pending_authorities()
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(queue, vec![first.id, second.id, third.id]);

        assert!(db.approve_authority(first.id).unwrap());
        assert!(!db.approve_authority(first.id).unwrap());
        assert!(db.get_account_by_id(first.id).unwrap().unwrap().is_cleared());

        assert!(db.reject_authority(second.id).unwrap());
        assert!(db.get_account_by_id(second.id).unwrap().is_none());
        assert!(!db.reject_authority(second.id).unwrap());

        // Approved accounts are no longer rejectable.
        assert!(!db.reject_authority(first.id).unwrap());

        let queue: Vec<i64> = db
            .list_pending_authorities()
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(queue, vec![third.id]);
    }

    #[test]
    fn seed_admin_is_created_once() {
        let (_dir, db) = open_temp();
        let admin = NewAccount {
            name: "Admin".into(),
            feedback_route: Some("Mayor's Office".into()),
            ..authority("+10000000000", "admin@city.gov")
        };

        assert!(!db.admin_exists().unwrap());
        let first = db.ensure_seed_admin(&admin).unwrap();
        assert!(db.admin_exists().unwrap());
        let SeedOutcome::Created(id) = first else {
            panic!("expected a new admin, got {:?}", first);
        };
        assert_eq!(db.ensure_seed_admin(&admin).unwrap(), SeedOutcome::AlreadyPresent);

        let row = db.get_account_by_id(id).unwrap().unwrap();
        assert!(row.is_admin);
        assert!(row.is_approved);
        assert!(db.list_pending_authorities().unwrap().is_empty());
    }

    #[test]
    fn profile_update_bumps_updated_at_and_can_clear_fields() {
        let (_dir, db) = open_temp();
        let created = db.create_account(&citizen("+15550031", Some("old@city.gov"))).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let changes = ProfileChanges {
            name: Some("Renamed".into()),
            email: Some(None),
            ..ProfileChanges::default()
        };
        let updated = db.update_profile(created.id, &changes).unwrap().unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.email, None);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert!(db.update_profile(9999, &changes).unwrap().is_none());
    }

    #[test]
    fn login_is_recorded() {
        let (_dir, db) = open_temp();
        let created = db.create_account(&citizen("+15550041", None)).unwrap();
        assert!(created.last_login.is_none());

        db.record_login(created.id).unwrap();
        assert!(db.get_account_by_id(created.id).unwrap().unwrap().last_login.is_some());
    }
}
