//! Durable combination cache storage.
//!
//! Two relations back the whole game state:
//!
//! ```text
//! elements(name PK, icon, created_at)
//! pairs(left_name, right_name, result -> elements.name NULL, created_at)
//!       PK (left_name, right_name), left_name <= right_name
//! ```
//!
//! Every write is an `INSERT ... ON CONFLICT DO NOTHING` whose affected-row
//! count tells the caller whether it created the row. Uniqueness therefore
//! comes from the primary keys and holds across processes sharing one
//! database file; the in-process mutex only exists because
//! [`rusqlite::Connection`] is not `Sync`.

mod elements;
mod pairs;
mod save;
mod sqlite_util;

pub use elements::ElementStore;
pub use pairs::PairCache;
pub use save::{IconMismatch, ImportReport, SaveFile, SavedElement};

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, TransactionBehavior};

use kiln_types::{Element, ElementName, PairKey, PairRecord, Resolution};

use crate::sqlite_util::{now_iso8601, prepare_db_path};

/// The four elements every game starts with.
pub const STARTING_ELEMENTS: [(&str, &str); 4] = [
    ("Water", "💧"),
    ("Fire", "🔥"),
    ("Wind", "🌬️"),
    ("Earth", "🌍"),
];

/// Outcome of [`Store::record_combination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// This call created the pair record.
    ///
    /// `first_discovery` is true when the same transaction also created the
    /// element.
    Won {
        element: Element,
        first_discovery: bool,
    },
    /// Another writer recorded the pair first; nothing was written.
    Lost(PairRecord),
}

/// Row counts plus a referential integrity probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub elements: u64,
    pub pairs: u64,
    pub produced_pairs: u64,
    pub barren_pairs: u64,
    /// Pairs whose result names a missing element. Always zero unless the
    /// database was modified outside this crate.
    pub dangling_results: u64,
}

/// SQLite-backed element store and pair cache.
pub struct Store {
    db: Mutex<Connection>,
}

impl Store {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS elements (
            name TEXT PRIMARY KEY NOT NULL CHECK (length(name) > 0),
            icon TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pairs (
            left_name TEXT NOT NULL,
            right_name TEXT NOT NULL,
            result TEXT REFERENCES elements(name),
            created_at TEXT NOT NULL,
            PRIMARY KEY (left_name, right_name),
            CHECK (left_name <= right_name)
        );

        CREATE INDEX IF NOT EXISTS idx_pairs_result
        ON pairs(result) WHERE result IS NOT NULL;
    ";

    /// How long a write waits on another connection's lock before failing.
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open or create the store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_busy_timeout(path, Self::DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        prepare_db_path(path)?;

        let db = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        let store = Self::initialize(db, busy_timeout)?;
        tracing::debug!(path = %path.display(), "Opened store");
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::initialize(db, Self::DEFAULT_BUSY_TIMEOUT)
    }

    fn initialize(db: Connection, busy_timeout: Duration) -> Result<Self> {
        db.busy_timeout(busy_timeout)
            .context("Failed to set store busy timeout")?;
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )
        .context("Failed to set store pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create store schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("Store connection lock poisoned"))
    }

    #[must_use]
    pub fn elements(&self) -> ElementStore<'_> {
        ElementStore::new(self)
    }

    #[must_use]
    pub fn pairs(&self) -> PairCache<'_> {
        PairCache::new(self)
    }

    /// Record that `key` produces `element`, creating the element if needed.
    ///
    /// Both inserts run in one immediate transaction. If the pair already has
    /// a record the transaction is rolled back, so an element is only ever
    /// created together with the pair that first produced it, and the first
    /// discovery is credited to that pair's writer alone.
    pub fn record_combination(&self, key: &PairKey, element: &Element) -> Result<Recorded> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to start combination transaction")?;

        if let Some(existing) = pairs::lookup(&tx, key)? {
            return Ok(Recorded::Lost(existing));
        }

        let created_at = now_iso8601();
        let (stored, first_discovery) =
            elements::insert_if_absent(&tx, &element.name, &element.icon, &created_at)?;
        let resolution = Resolution::Produced(element.name.clone());
        let (record, won) = pairs::insert_if_absent(&tx, key, &resolution, &created_at)?;
        if !won {
            // Dropping `tx` rolls back the element insert as well.
            return Ok(Recorded::Lost(record));
        }

        tx.commit()
            .context("Failed to commit combination transaction")?;
        Ok(Recorded::Won {
            element: stored,
            first_discovery,
        })
    }

    /// Insert the starting elements that are not already present.
    ///
    /// Returns how many were inserted.
    pub fn seed_starting_elements(&self) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to start seed transaction")?;
        let created_at = now_iso8601();
        let mut inserted = 0;
        for (name, icon) in STARTING_ELEMENTS {
            let name = ElementName::new(name)?;
            if elements::insert_if_absent(&tx, &name, icon, &created_at)?.1 {
                inserted += 1;
            }
        }
        tx.commit().context("Failed to commit seed transaction")?;
        Ok(inserted)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM elements),
                (SELECT COUNT(*) FROM pairs),
                (SELECT COUNT(*) FROM pairs WHERE result IS NOT NULL),
                (SELECT COUNT(*) FROM pairs p
                    LEFT JOIN elements e ON e.name = p.result
                    WHERE p.result IS NOT NULL AND e.name IS NULL)",
            [],
            |row| {
                let elements: i64 = row.get(0)?;
                let pairs: i64 = row.get(1)?;
                let produced: i64 = row.get(2)?;
                let dangling: i64 = row.get(3)?;
                Ok(StoreStats {
                    elements: elements as u64,
                    pairs: pairs as u64,
                    produced_pairs: produced as u64,
                    barren_pairs: (pairs - produced) as u64,
                    dangling_results: dangling as u64,
                })
            },
        )
        .context("Failed to query store stats")
    }
}
