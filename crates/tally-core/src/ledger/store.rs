//! Ledger storage layer
//!
//! Persists the call ledger and the alert dedup marker as small JSON files.
//! Writes go to a temporary file in the target directory which is then
//! renamed over the destination, so a crash never leaves a truncated file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Ledger;
use crate::error::{Error, Result};

// ============================================================================
// JSON file helpers
// ============================================================================

/// Read and deserialize a JSON file. A missing file is `Ok(None)`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::persistence(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        Error::persistence(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Serialize to JSON and atomically replace `path`
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let write = || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, value)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    };

    write().map_err(|e| Error::persistence(format!("Failed to write {}: {}", path.display(), e)))
}

// ============================================================================
// LedgerStore
// ============================================================================

/// File-backed store for the call ledger
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger. A missing file is an empty ledger.
    pub fn load(&self) -> Result<Ledger> {
        let ledger = read_json::<Ledger>(&self.path)?.unwrap_or_default();
        log::debug!(
            "[governor:store] Loaded {} call records from {}",
            ledger.len(),
            self.path.display()
        );
        Ok(ledger)
    }

    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        write_json_atomic(&self.path, ledger)?;
        log::debug!(
            "[governor:store] Saved {} call records to {}",
            ledger.len(),
            self.path.display()
        );
        Ok(())
    }
}

// ============================================================================
// Alert marker
// ============================================================================

/// Durable alert bookkeeping
///
/// `date` is the last calendar day a digest was delivered and keeps the
/// `{"date": "YYYY-MM-DD"}` shape of older marker files. `alert_sent_on`
/// is the day the monthly alert was last delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMarker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_sent_on: Option<NaiveDate>,
}

/// File-backed store for the [`AlertMarker`]
#[derive(Debug, Clone)]
pub struct AlertMarkerStore {
    path: PathBuf,
}

impl AlertMarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker path conventionally paired with a ledger file:
    /// `usage/api_calls.json` -> `usage/api_calls_alert_flag.json`
    pub fn beside(ledger_path: &Path) -> Self {
        let stem = ledger_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "api_calls".to_string());
        Self::new(ledger_path.with_file_name(format!("{stem}_alert_flag.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AlertMarker> {
        Ok(read_json::<AlertMarker>(&self.path)?.unwrap_or_default())
    }

    pub fn save(&self, marker: &AlertMarker) -> Result<()> {
        write_json_atomic(&self.path, marker)
    }
}

// ============================================================================
// Tests
// ============================================================================
