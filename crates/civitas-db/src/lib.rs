pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

pub use error::{DbError, Result};
pub use migrations::EvolutionReport;

/// SQL expression for "now" in the stored timestamp format.
macro_rules! now_sql {
    () => {
        "strftime('%Y-%m-%d %H:%M:%f', 'now')"
    };
}
pub(crate) use now_sql;

pub const NOW_SQL: &str = now_sql!();

const ACQUIRE_BACKOFF: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    /// How long a caller may wait for a free connection before failing.
    pub acquire_timeout: Duration,
    /// Connections idle longer than this are reopened on next use.
    pub idle_recycle: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(2),
            idle_recycle: Duration::from_secs(30 * 60),
        }
    }
}

struct Slot {
    conn: Option<Connection>,
    last_used: Instant,
}

/// Bounded pool of SQLite connections over one database file.
///
/// Slots open lazily. Acquisition never queues unboundedly: it scans for a
/// free slot until `acquire_timeout` elapses and then fails with
/// [`DbError::Unavailable`].
pub struct Database {
    path: PathBuf,
    slots: Vec<Mutex<Slot>>,
    next: AtomicUsize,
    config: PoolConfig,
    evolution: EvolutionReport,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, PoolConfig::default())
    }

    /// Open the store and run the schema evolution pass before returning.
    /// Individual patch failures are logged and recorded in the report;
    /// only failure to create the base tables is an error.
    pub fn open_with(path: &Path, config: PoolConfig) -> Result<Self> {
        let max_connections = config.max_connections.max(1);
        let conn = open_connection(path, config.acquire_timeout)?;
        let evolution = migrations::run(&conn)?;

        let mut slots = Vec::with_capacity(max_connections);
        slots.push(Mutex::new(Slot {
            conn: Some(conn),
            last_used: Instant::now(),
        }));
        for _ in 1..max_connections {
            slots.push(Mutex::new(Slot {
                conn: None,
                last_used: Instant::now(),
            }));
        }

        info!(
            "Database opened at {} (pool of {} connections)",
            path.display(),
            max_connections
        );
        Ok(Self {
            path: path.to_path_buf(),
            slots,
            next: AtomicUsize::new(0),
            config,
            evolution,
        })
    }

    /// Report of the evolution pass that ran when the store was opened.
    pub fn evolution_report(&self) -> &EvolutionReport {
        &self.evolution
    }

    /// Re-run the evolution pass on a pooled connection.
    pub fn evolve(&self) -> Result<EvolutionReport> {
        self.with_conn(migrations::run)
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut slot = self.acquire()?;
        let conn = self.ready(&mut slot)?;
        f(conn)
    }

    /// Run `f` inside an IMMEDIATE transaction: committed on `Ok`, rolled
    /// back on `Err` (or if `f` panics and the transaction is dropped).
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut slot = self.acquire()?;
        let conn = self.ready(&mut slot)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    fn acquire(&self) -> Result<MutexGuard<'_, Slot>> {
        let deadline = Instant::now() + self.config.acquire_timeout;
        let len = self.slots.len();

        loop {
            let start = self.next.fetch_add(1, Ordering::Relaxed);
            for offset in 0..len {
                let idx = (start + offset) % len;
                match self.slots[idx].try_lock() {
                    Ok(guard) => return Ok(guard),
                    Err(TryLockError::WouldBlock) => continue,
                    Err(TryLockError::Poisoned(poisoned)) => {
                        warn!("Connection slot {} was poisoned; reopening", idx);
                        let mut guard = poisoned.into_inner();
                        guard.conn = None;
                        self.slots[idx].clear_poison();
                        return Ok(guard);
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(DbError::Unavailable(format!(
                    "all {} connections busy for {:?}",
                    len, self.config.acquire_timeout
                )));
            }
            std::thread::sleep(ACQUIRE_BACKOFF);
        }
    }

    fn ready<'s>(&self, slot: &'s mut Slot) -> Result<&'s mut Connection> {
        if slot.conn.is_some() && slot.last_used.elapsed() > self.config.idle_recycle {
            debug!("Recycling idle connection");
            slot.conn = None;
        }
        slot.last_used = Instant::now();

        if slot.conn.is_none() {
            slot.conn = Some(open_connection(&self.path, self.config.acquire_timeout)?);
        }
        slot.conn
            .as_mut()
            .ok_or_else(|| DbError::Unavailable("connection slot empty".into()))
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| DbError::Unavailable(format!("cannot open {}: {}", path.display(), e)))?;

    // WAL mode for concurrent reads
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)?;

    Ok(conn)
}
