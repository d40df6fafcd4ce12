//! Import and export of the game's saved element list.
//!
//! The game keeps discovered elements in browser local storage as
//! `{"elements": [{"text": "Water", "emoji": "💧", "discovered": false}, ...]}`.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use kiln_types::{Element, ElementName, InvalidIdentifier};

use crate::Store;
use crate::elements;
use crate::sqlite_util::now_iso8601;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveFile {
    pub elements: Vec<SavedElement>,
}

/// One element as the game stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedElement {
    pub text: String,
    pub emoji: String,
    /// The game's own first-discovery marker. Kiln reports discovery as an
    /// event instead, so this is ignored on import and `false` on export.
    #[serde(default)]
    pub discovered: bool,
}

impl From<Element> for SavedElement {
    fn from(element: Element) -> Self {
        Self {
            text: element.name.into_inner(),
            emoji: element.icon,
            discovered: false,
        }
    }
}

/// An imported element whose name exists with a different icon.
///
/// The stored icon is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconMismatch {
    pub name: ElementName,
    pub stored: String,
    pub imported: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub already_present: usize,
    pub icon_mismatches: Vec<IconMismatch>,
    pub invalid: Vec<InvalidIdentifier>,
}

impl Store {
    /// Import every element of a save file.
    pub fn import_save(&self, path: &Path) -> Result<ImportReport> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read save file {}", path.display()))?;
        let save: SaveFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse save file {}", path.display()))?;
        self.import_elements(&save.elements)
    }

    /// Insert-if-absent each element in one transaction.
    ///
    /// Existing elements are never modified; a differing icon is reported in
    /// [`ImportReport::icon_mismatches`]. Invalid names are skipped and
    /// reported rather than failing the import.
    pub fn import_elements(&self, saved: &[SavedElement]) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to start import transaction")?;
        let created_at = now_iso8601();

        for entry in saved {
            let name = match ElementName::new(entry.text.as_str()) {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!("Skipping save entry: {e}");
                    report.invalid.push(e);
                    continue;
                }
            };

            let (stored, inserted) =
                elements::insert_if_absent(&tx, &name, &entry.emoji, &created_at)?;
            if inserted {
                tracing::debug!(element = %name, "Imported element");
                report.inserted += 1;
            } else if stored.icon == entry.emoji {
                report.already_present += 1;
            } else {
                tracing::warn!(
                    element = %name,
                    stored = %stored.icon,
                    imported = %entry.emoji,
                    "Icon mismatch on import, keeping stored icon"
                );
                report.icon_mismatches.push(IconMismatch {
                    name,
                    stored: stored.icon,
                    imported: entry.emoji.clone(),
                });
            }
        }

        tx.commit().context("Failed to commit import transaction")?;
        Ok(report)
    }

    /// Write every stored element to `path` in save file format.
    ///
    /// The file is replaced atomically. Returns the number of elements written.
    pub fn export_save(&self, path: &Path) -> Result<usize> {
        let save = SaveFile {
            elements: self
                .elements()
                .all()?
                .into_iter()
                .map(SavedElement::from)
                .collect(),
        };
        let json = serde_json::to_string(&save).context("Failed to serialize save file")?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write save file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync save file")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(save.elements.len())
    }
}
