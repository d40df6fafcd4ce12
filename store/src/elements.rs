//! Element Store: durable element name -> icon mapping with insert-if-absent.

use anyhow::{Context, Result, anyhow};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use kiln_types::{Element, ElementName};

use crate::Store;
use crate::sqlite_util::now_iso8601;

/// Handle for element operations on a [`Store`].
///
/// An element either exists in the store (it has been discovered) or it does
/// not. There is no update or delete path.
#[derive(Clone, Copy)]
pub struct ElementStore<'s> {
    store: &'s Store,
}

impl<'s> ElementStore<'s> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Look up an element by name.
    pub fn get(&self, name: &ElementName) -> Result<Option<Element>> {
        let conn = self.store.conn()?;
        get(&conn, name)
    }

    /// Insert `name` with `icon` unless an element with that name exists.
    ///
    /// Returns the stored element and whether this call created it. When the
    /// element already existed, the stored icon is returned and `icon` is
    /// ignored. Exactly one caller ever sees `true` for a given name, including
    /// callers in other processes sharing the database file.
    pub fn insert_if_absent(&self, name: &ElementName, icon: &str) -> Result<(Element, bool)> {
        let conn = self.store.conn()?;
        insert_if_absent(&conn, name, icon, &now_iso8601())
    }

    /// All elements, ordered by name.
    pub fn all(&self) -> Result<Vec<Element>> {
        let conn = self.store.conn()?;
        all(&conn)
    }

    /// All element names, ordered by name.
    pub fn names(&self) -> Result<Vec<ElementName>> {
        let conn = self.store.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM elements ORDER BY name")
            .context("Failed to prepare element names query")?;
        let rows = stmt
            .query_map([], |row| name_column(row, 0))
            .context("Failed to query element names")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read element name row")
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.store.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM elements", [], |row| row.get(0))
            .context("Failed to count elements")?;
        Ok(count as u64)
    }
}

pub(crate) fn get(conn: &Connection, name: &ElementName) -> Result<Option<Element>> {
    conn.query_row(
        "SELECT name, icon FROM elements WHERE name = ?1",
        [name.as_str()],
        element_row,
    )
    .optional()
    .with_context(|| format!("Failed to look up element {name}"))
}

pub(crate) fn insert_if_absent(
    conn: &Connection,
    name: &ElementName,
    icon: &str,
    created_at: &str,
) -> Result<(Element, bool)> {
    let inserted = conn
        .execute(
            "INSERT INTO elements (name, icon, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO NOTHING",
            params![name.as_str(), icon, created_at],
        )
        .with_context(|| format!("Failed to insert element {name}"))?;

    if inserted == 1 {
        return Ok((Element::new(name.clone(), icon), true));
    }

    // Lost to an earlier insert. Rows are never deleted, so the winner is visible.
    let existing = get(conn, name)?
        .ok_or_else(|| anyhow!("Element {name} conflicted on insert but is missing"))?;
    Ok((existing, false))
}

pub(crate) fn all(conn: &Connection) -> Result<Vec<Element>> {
    let mut stmt = conn
        .prepare("SELECT name, icon FROM elements ORDER BY name")
        .context("Failed to prepare elements query")?;
    let rows = stmt
        .query_map([], element_row)
        .context("Failed to query elements")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read element row")
}

fn element_row(row: &Row<'_>) -> rusqlite::Result<Element> {
    Ok(Element::new(name_column(row, 0)?, row.get::<_, String>(1)?))
}

/// Read a stored name, rejecting rows written outside this crate that fail validation.
pub(crate) fn name_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<ElementName> {
    let raw: String = row.get(idx)?;
    ElementName::new(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
