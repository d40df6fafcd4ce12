//! Pair Cache: durable canonical pair -> resolution mapping.
//!
//! The `result` column is nullable in SQL; here it only ever surfaces as a
//! [`Resolution`], and a missing row means the pair was never combined.

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

use kiln_types::{ElementName, PairKey, PairRecord, Resolution};

use crate::Store;
use crate::sqlite_util::now_iso8601;

/// Handle for pair cache operations on a [`Store`].
#[derive(Clone, Copy)]
pub struct PairCache<'s> {
    store: &'s Store,
}

impl<'s> PairCache<'s> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Look up the record for a canonical pair.
    pub fn lookup(&self, key: &PairKey) -> Result<Option<PairRecord>> {
        let conn = self.store.conn()?;
        lookup(&conn, key)
    }

    /// Store `resolution` for `key` unless the pair already has a record.
    ///
    /// Returns the stored record and whether this call created it. An existing
    /// record is never overwritten, even if `resolution` differs. A
    /// `Produced` resolution must name an element that is already stored.
    pub fn insert_if_absent(
        &self,
        key: &PairKey,
        resolution: &Resolution,
    ) -> Result<(PairRecord, bool)> {
        let conn = self.store.conn()?;
        insert_if_absent(&conn, key, resolution, &now_iso8601())
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.store.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pairs", [], |row| row.get(0))
            .context("Failed to count pairs")?;
        Ok(count as u64)
    }

    /// Resolved pairs whose inputs are both stored elements.
    ///
    /// With `n` stored elements there are `n * (n + 1) / 2` such pairs, so
    /// equality means every known combination has been tried.
    pub fn count_between_known(&self) -> Result<u64> {
        let conn = self.store.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pairs p
                 JOIN elements l ON l.name = p.left_name
                 JOIN elements r ON r.name = p.right_name",
                [],
                |row| row.get(0),
            )
            .context("Failed to count pairs between known elements")?;
        Ok(count as u64)
    }
}

pub(crate) fn lookup(conn: &Connection, key: &PairKey) -> Result<Option<PairRecord>> {
    let row: Option<Option<String>> = conn
        .query_row(
            "SELECT result FROM pairs WHERE left_name = ?1 AND right_name = ?2",
            params![key.left().as_str(), key.right().as_str()],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to look up pair {key}"))?;

    let Some(result) = row else {
        return Ok(None);
    };
    let resolution = match result {
        Some(name) => Resolution::Produced(
            ElementName::new(name)
                .with_context(|| format!("Pair {key} has a malformed result"))?,
        ),
        None => Resolution::Barren,
    };
    Ok(Some(PairRecord {
        key: key.clone(),
        resolution,
    }))
}

pub(crate) fn insert_if_absent(
    conn: &Connection,
    key: &PairKey,
    resolution: &Resolution,
    created_at: &str,
) -> Result<(PairRecord, bool)> {
    let inserted = conn
        .execute(
            "INSERT INTO pairs (left_name, right_name, result, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(left_name, right_name) DO NOTHING",
            params![
                key.left().as_str(),
                key.right().as_str(),
                resolution.result().map(ElementName::as_str),
                created_at
            ],
        )
        .with_context(|| format!("Failed to insert pair {key}"))?;

    if inserted == 1 {
        let record = PairRecord {
            key: key.clone(),
            resolution: resolution.clone(),
        };
        return Ok((record, true));
    }

    let existing =
        lookup(conn, key)?.ok_or_else(|| anyhow!("Pair {key} conflicted on insert but is missing"))?;
    Ok((existing, false))
}
