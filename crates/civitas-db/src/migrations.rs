//! Additive schema evolution.
//!
//! There is no version ledger. Every startup compares the live schema
//! (`PRAGMA table_info`, `sqlite_master`) against the column and index sets
//! below and adds whatever is missing. Each patch runs in its own
//! transaction; a failed patch is logged and recorded, and the pass moves on.

use std::collections::HashSet;

use rusqlite::Connection;
use tracing::{info, warn};

use crate::{Result, now_sql};

/// Canonical column list of `users`, shared by table creation and the
/// created_at rebuild.
macro_rules! users_columns {
    () => {
        concat!(
            "
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        phone_number    TEXT NOT NULL,
        email           TEXT,
        password_hash   TEXT NOT NULL,
        address         TEXT,
        department      TEXT,
        position        TEXT,
        feedback_route  TEXT,
        user_type       TEXT NOT NULL DEFAULT 'citizen',
        is_active       INTEGER NOT NULL DEFAULT 1,
        is_approved     INTEGER NOT NULL DEFAULT 0,
        is_admin        INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL DEFAULT (",
            now_sql!(),
            "),
        updated_at      TEXT NOT NULL DEFAULT (",
            now_sql!(),
            "),
        last_login      TEXT
        "
        )
    };
}

const BASE_SCHEMA: &str = concat!(
    "
    CREATE TABLE IF NOT EXISTS users (",
    users_columns!(),
    ");

    CREATE TABLE IF NOT EXISTS feedbacks (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id         INTEGER REFERENCES users(id) ON DELETE SET NULL,
        authority_id    INTEGER REFERENCES users(id) ON DELETE SET NULL,
        category        TEXT NOT NULL,
        message         TEXT NOT NULL,
        authority_type  TEXT,
        priority        TEXT,
        location        TEXT,
        status          TEXT NOT NULL DEFAULT 'reported',
        authority_notes TEXT,
        created_at      TEXT NOT NULL DEFAULT (",
    now_sql!(),
    "),
        updated_at      TEXT NOT NULL DEFAULT (",
    now_sql!(),
    ")
    );

    CREATE TABLE IF NOT EXISTS chat_messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        sender      TEXT NOT NULL,
        message     TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (",
    now_sql!(),
    ")
    );

    CREATE TABLE IF NOT EXISTS announcements (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        title       TEXT NOT NULL,
        content     TEXT NOT NULL,
        audience    TEXT,
        author_id   INTEGER REFERENCES users(id) ON DELETE SET NULL,
        created_at  TEXT NOT NULL DEFAULT (",
    now_sql!(),
    ")
    );
    "
);

/// One "ensure this column exists" step.
#[derive(Debug, Clone, Copy)]
pub struct ColumnPatch {
    pub table: &'static str,
    pub column: &'static str,
    /// Column definition for `ALTER TABLE .. ADD COLUMN`. SQLite only accepts
    /// constant defaults here, so time-valued columns are added nullable and
    /// filled by `backfill`.
    pub definition: &'static str,
    pub backfill: Option<&'static str>,
}

pub const COLUMN_PATCHES: &[ColumnPatch] = &[
    ColumnPatch {
        table: "users",
        column: "email",
        definition: "email TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "address",
        definition: "address TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "department",
        definition: "department TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "position",
        definition: "position TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "feedback_route",
        definition: "feedback_route TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "user_type",
        definition: "user_type TEXT NOT NULL DEFAULT 'citizen'",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "is_active",
        definition: "is_active INTEGER NOT NULL DEFAULT 1",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "is_approved",
        definition: "is_approved INTEGER NOT NULL DEFAULT 0",
        // Citizens never needed approval; older authorities queue for review.
        backfill: Some(
            "UPDATE users SET is_approved = 1 WHERE lower(COALESCE(user_type, 'citizen')) <> 'authority'",
        ),
    },
    ColumnPatch {
        table: "users",
        column: "is_admin",
        definition: "is_admin INTEGER NOT NULL DEFAULT 0",
        backfill: None,
    },
    ColumnPatch {
        table: "users",
        column: "created_at",
        definition: "created_at TEXT",
        backfill: Some(concat!(
            "UPDATE users SET created_at = ",
            now_sql!(),
            " WHERE created_at IS NULL"
        )),
    },
    ColumnPatch {
        table: "users",
        column: "updated_at",
        definition: "updated_at TEXT",
        backfill: Some(concat!(
            "UPDATE users SET updated_at = COALESCE(created_at, ",
            now_sql!(),
            ") WHERE updated_at IS NULL"
        )),
    },
    ColumnPatch {
        table: "users",
        column: "last_login",
        definition: "last_login TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "feedbacks",
        column: "authority_id",
        definition: "authority_id INTEGER REFERENCES users(id) ON DELETE SET NULL",
        backfill: None,
    },
    ColumnPatch {
        table: "feedbacks",
        column: "authority_type",
        definition: "authority_type TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "feedbacks",
        column: "priority",
        definition: "priority TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "feedbacks",
        column: "location",
        definition: "location TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "feedbacks",
        column: "authority_notes",
        definition: "authority_notes TEXT",
        backfill: None,
    },
    ColumnPatch {
        table: "feedbacks",
        column: "updated_at",
        definition: "updated_at TEXT",
        backfill: Some(concat!(
            "UPDATE feedbacks SET updated_at = COALESCE(created_at, ",
            now_sql!(),
            ") WHERE updated_at IS NULL"
        )),
    },
    ColumnPatch {
        table: "announcements",
        column: "audience",
        definition: "audience TEXT",
        backfill: None,
    },
];

#[derive(Debug, Clone, Copy)]
pub struct IndexPatch {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Indexes and uniqueness constraints. Applied after the column patches so
/// every indexed column exists.
pub const INDEX_PATCHES: &[IndexPatch] = &[
    IndexPatch {
        name: "uq_users_phone_number",
        sql: "CREATE UNIQUE INDEX IF NOT EXISTS uq_users_phone_number ON users(phone_number)",
    },
    IndexPatch {
        name: "uq_users_email",
        sql: "CREATE UNIQUE INDEX IF NOT EXISTS uq_users_email ON users(email)",
    },
    IndexPatch {
        name: "idx_users_pending",
        sql: "CREATE INDEX IF NOT EXISTS idx_users_pending ON users(user_type, is_approved, created_at)",
    },
    IndexPatch {
        name: "idx_feedbacks_user",
        sql: "CREATE INDEX IF NOT EXISTS idx_feedbacks_user ON feedbacks(user_id, created_at)",
    },
    IndexPatch {
        name: "idx_feedbacks_route",
        sql: "CREATE INDEX IF NOT EXISTS idx_feedbacks_route ON feedbacks(authority_type, status, created_at)",
    },
    IndexPatch {
        name: "idx_chat_messages_user",
        sql: "CREATE INDEX IF NOT EXISTS idx_chat_messages_user ON chat_messages(user_id, id)",
    },
    IndexPatch {
        name: "idx_announcements_created",
        sql: "CREATE INDEX IF NOT EXISTS idx_announcements_created ON announcements(created_at)",
    },
];

const CREATED_AT_PATCH: &str = "users.created_at:not_null_default";

/// Outcome of one evolution pass, by patch name (`table.column`,
/// `index:<name>`, or the created_at tightening step).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvolutionReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl EvolutionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, name: String, outcome: Result<bool>) {
        match outcome {
            Ok(true) => {
                info!("Schema patch applied: {}", name);
                self.applied.push(name);
            }
            Ok(false) => self.skipped.push(name),
            Err(e) => {
                warn!("Schema patch '{}' failed, continuing: {}", name, e);
                self.failed.push(name);
            }
        }
    }
}

/// Bring the live schema forward. Only failure to create the base tables is
/// returned as an error; everything after that is best effort.
pub fn run(conn: &Connection) -> Result<EvolutionReport> {
    conn.execute_batch(BASE_SCHEMA)?;

    let mut report = EvolutionReport::default();

    for patch in COLUMN_PATCHES {
        report.record(
            format!("{}.{}", patch.table, patch.column),
            ensure_column(conn, patch),
        );
    }

    report.record(CREATED_AT_PATCH.to_string(), tighten_users_created_at(conn));

    for index in INDEX_PATCHES {
        report.record(format!("index:{}", index.name), ensure_index(conn, index));
    }

    info!(
        "Schema evolution complete: {} applied, {} already current, {} failed",
        report.applied.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Returns `Ok(true)` when the column was added.
fn ensure_column(conn: &Connection, patch: &ColumnPatch) -> Result<bool> {
    if table_columns(conn, patch.table)?.contains(patch.column) {
        return Ok(false);
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {}",
        patch.table, patch.definition
    ))?;
    if let Some(backfill) = patch.backfill {
        tx.execute_batch(backfill)?;
    }
    tx.commit()?;
    Ok(true)
}

fn ensure_index(conn: &Connection, index: &IndexPatch) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        [index.name],
        |row| row.get(0),
    )?;
    if exists > 0 {
        return Ok(false);
    }
    conn.execute_batch(index.sql)?;
    Ok(true)
}

/// Earlier deployments created `users.created_at` nullable and without a
/// default. SQLite cannot alter a column in place, so the table is rebuilt
/// with the canonical definition plus any columns it does not declare:
/// backfill, copy, swap, all in one transaction with foreign-key
/// enforcement suspended.
fn tighten_users_created_at(conn: &Connection) -> Result<bool> {
    let column = column_info(conn, "users", "created_at")?;
    if let Some(info) = &column {
        if info.not_null && info.default.is_some() {
            return Ok(false);
        }
    }

    // foreign_keys cannot change inside a transaction.
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    let outcome = rebuild_users(conn);
    conn.pragma_update(None, "foreign_keys", "ON")?;
    outcome.map(|_| true)
}

fn rebuild_users(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    // Columns and indexes the canonical definition does not know about are
    // carried across unchanged.
    let extras: Vec<ColumnInfo> = table_layout(&tx, "users")?
        .into_iter()
        .filter(|column| !USERS_COLUMNS.contains(&column.name.as_str()))
        .collect();
    let companions: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT sql FROM sqlite_master
             WHERE tbl_name = 'users' AND type IN ('index', 'trigger') AND sql IS NOT NULL",
        )?;
        let sqls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        sqls
    };

    let mut create = String::from(concat!("CREATE TABLE users__evolved (", users_columns!()));
    for column in &extras {
        create.push_str(",\n        ");
        create.push_str(&column.definition());
    }
    create.push(')');

    let extra_names: String = extras
        .iter()
        .map(|column| format!(", {}", quote_ident(&column.name)))
        .collect();

    tx.execute_batch(concat!(
        "UPDATE users SET created_at = ",
        now_sql!(),
        " WHERE created_at IS NULL;
        DROP TABLE IF EXISTS users__evolved;"
    ))?;
    tx.execute_batch(&create)?;
    tx.execute_batch(&format!(
        "INSERT INTO users__evolved (
            id, name, phone_number, email, password_hash, address, department, position,
            feedback_route, user_type, is_active, is_approved, is_admin,
            created_at, updated_at, last_login{extra}
        )
        SELECT
            id, name, phone_number, email, password_hash, address, department, position,
            feedback_route, COALESCE(user_type, 'citizen'), COALESCE(is_active, 1),
            COALESCE(is_approved, 0), COALESCE(is_admin, 0),
            created_at, COALESCE(updated_at, created_at), last_login{extra}
        FROM users;
        DROP TABLE users;
        ALTER TABLE users__evolved RENAME TO users;",
        extra = extra_names
    ))?;
    for sql in &companions {
        tx.execute_batch(sql)?;
    }
    if !extras.is_empty() {
        info!("Kept {} unrecognised users columns through the rebuild", extras.len());
    }

    let dangling = {
        let mut stmt = tx.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        let mut count = 0usize;
        while rows.next()?.is_some() {
            count += 1;
        }
        count
    };
    if dangling > 0 {
        // Dropping `tx` rolls the rebuild back.
        return Err(crate::DbError::Corrupt(format!(
            "{} dangling foreign keys after users rebuild",
            dangling
        )));
    }

    tx.commit()?;
    Ok(())
}

/// Column names declared by `users_columns!`.
const USERS_COLUMNS: &[&str] = &[
    "id",
    "name",
    "phone_number",
    "email",
    "password_hash",
    "address",
    "department",
    "position",
    "feedback_route",
    "user_type",
    "is_active",
    "is_approved",
    "is_admin",
    "created_at",
    "updated_at",
    "last_login",
];

struct ColumnInfo {
    name: String,
    decl_type: String,
    not_null: bool,
    default: Option<String>,
}

impl ColumnInfo {
    /// Column definition as it appears in the live table.
    fn definition(&self) -> String {
        let mut definition = quote_ident(&self.name);
        if !self.decl_type.is_empty() {
            definition.push(' ');
            definition.push_str(&self.decl_type);
        }
        if self.not_null {
            definition.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            definition.push_str(" DEFAULT ");
            definition.push_str(default);
        }
        definition
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(names)
}

fn table_layout(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(3)? != 0,
                default: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn column_info(conn: &Connection, table: &str, column: &str) -> Result<Option<ColumnInfo>> {
    Ok(table_layout(conn, table)?
        .into_iter()
        .find(|info| info.name == column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn schema_snapshot(conn: &Connection) -> Vec<(String, Option<String>)> {
        let mut stmt = conn
            .prepare("SELECT name, sql FROM sqlite_master WHERE name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    /// Users table as the first deployments created it.
    fn legacy_store(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                email TEXT,
                password_hash TEXT NOT NULL,
                user_type TEXT NOT NULL,
                created_at TEXT
             );
             CREATE TABLE feedbacks (
                id INTEGER PRIMARY KEY,
                user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                category TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'reported',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
             );
             INSERT INTO users (id, name, phone_number, email, password_hash, user_type, created_at)
                VALUES (1, 'Ada', '+15550100', 'ada@example.org', 'hash', 'USER', NULL);
             INSERT INTO users (id, name, phone_number, email, password_hash, user_type, created_at)
                VALUES (2, 'Grace', '+15550101', NULL, 'hash', 'AUTHORITY', '2024-01-02 03:04:05');
             INSERT INTO feedbacks (user_id, category, message) VALUES (1, 'Other', 'Broken lamp');",
        )
        .unwrap();
    }

    #[test]
    fn fresh_store_needs_no_patches() {
        let conn = Connection::open_in_memory().unwrap();
        let report = run(&conn).unwrap();

        assert!(report.is_clean());
        assert!(report.skipped.contains(&"users.is_approved".to_string()));
        assert!(report.skipped.contains(&CREATED_AT_PATCH.to_string()));
        assert!(report.applied.iter().all(|name| name.starts_with("index:")));
    }

    #[test]
    fn second_pass_changes_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        let before = schema_snapshot(&conn);

        let report = run(&conn).unwrap();

        assert!(report.is_clean());
        assert!(report.applied.is_empty());
        assert_eq!(schema_snapshot(&conn), before);
    }

    #[test]
    fn legacy_store_is_brought_forward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        legacy_store(&path);

        let db = Database::open(&path).unwrap();
        let report = db.evolution_report().clone();
        assert!(report.is_clean(), "failed patches: {:?}", report.failed);
        assert!(report.applied.contains(&"users.feedback_route".to_string()));
        assert!(report.applied.contains(&"feedbacks.authority_type".to_string()));
        assert!(report.applied.contains(&CREATED_AT_PATCH.to_string()));

        db.with_conn(|conn| {
            let info = column_info(conn, "users", "created_at")?.unwrap();
            assert!(info.not_null);
            assert!(info.default.is_some());

            let missing: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE created_at IS NULL OR updated_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(missing, 0);

            // Existing citizens stay usable; the authority must be reviewed.
            let approved: Vec<i64> = conn
                .prepare("SELECT id FROM users WHERE is_approved = 1 ORDER BY id")?
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            assert_eq!(approved, vec![1]);

            // The feedback row still points at its citizen after the rebuild.
            let owner: Option<i64> =
                conn.query_row("SELECT user_id FROM feedbacks", [], |row| row.get(0))?;
            assert_eq!(owner, Some(1));
            Ok(())
        })
        .unwrap();

        let legacy_citizen = db.get_account_by_id(1).unwrap().unwrap();
        assert_eq!(legacy_citizen.role, civitas_types::models::Role::Citizen);

        let pending = db.list_pending_authorities().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 2);
        assert!(!pending[0].is_cleared());

        let again = db.evolve().unwrap();
        assert!(again.applied.is_empty());
        assert!(again.is_clean());
    }

    #[test]
    fn rebuild_keeps_columns_it_does_not_declare() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    phone_number TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    nickname TEXT NOT NULL DEFAULT 'none',
                    created_at TEXT
                 );
                 CREATE INDEX idx_users_nickname ON users(nickname);
                 INSERT INTO users (name, phone_number, password_hash, nickname)
                    VALUES ('Ada', '+15550100', 'hash', 'keepme');",
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let report = db.evolution_report();
        assert!(report.is_clean(), "failed patches: {:?}", report.failed);
        assert!(report.applied.contains(&CREATED_AT_PATCH.to_string()));

        db.with_conn(|conn| {
            let nickname: String =
                conn.query_row("SELECT nickname FROM users WHERE id = 1", [], |row| row.get(0))?;
            assert_eq!(nickname, "keepme");

            let info = column_info(conn, "users", "nickname")?.unwrap();
            assert!(info.not_null);
            assert_eq!(info.default.as_deref(), Some("'none'"));

            let index: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_users_nickname'",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(index, 1);

            let created: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE created_at IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(created, 1);
            Ok(())
        })
        .unwrap();

        assert!(db.evolve().unwrap().applied.is_empty());
    }

    #[test]
    fn failed_patch_does_not_stop_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dupes.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    phone_number TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    created_at TEXT
                 );
                 INSERT INTO users (name, phone_number, password_hash) VALUES ('A', '+1555', 'h');
                 INSERT INTO users (name, phone_number, password_hash) VALUES ('B', '+1555', 'h');",
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let report = db.evolution_report();

        assert_eq!(report.failed, vec!["index:uq_users_phone_number".to_string()]);
        assert!(report.applied.contains(&"users.email".to_string()));
        assert!(report.applied.contains(&"index:uq_users_email".to_string()));
        assert!(report.applied.contains(&"index:idx_feedbacks_route".to_string()));
    }
}
