//! The one concrete [`CatalogBackend`](super::CatalogBackend): a directory of
//! per-project TOML fixture files.
//!
//! Each file is named `<project>.toml` and deserializes straight into a
//! [`CatalogRecord`](super::CatalogRecord). This stands in for a real
//! package-manager query (DNF/yum repo metadata) since that integration is
//! out of scope here; the shape of the fixture mirrors what such a backend
//! would hand back (name, summary, builds, changelog, direct requirements).

use std::path::Path;

use crate::errors::{ComposerError, Result};

use super::{CatalogBackend, CatalogRecord};

pub struct FixtureBackend {
    records: Vec<CatalogRecord>,
}

impl FixtureBackend {
    /// Load every `*.toml` file directly under `dir` as one [`CatalogRecord`].
    pub fn open(dir: &Path) -> Result<FixtureBackend> {
        let mut records = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FixtureBackend { records });
            }
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let bytes = std::fs::read_to_string(&path)?;
            let record: CatalogRecord = toml::from_str(&bytes)
                .map_err(|e| ComposerError::CatalogError(format!("{}: {e}", path.display())))?;
            records.push(record);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(FixtureBackend { records })
    }

    /// Build a backend directly from records, bypassing the filesystem.
    pub fn in_memory(records: Vec<CatalogRecord>) -> FixtureBackend {
        FixtureBackend { records }
    }
}

impl CatalogBackend for FixtureBackend {
    fn records(&self) -> Result<Vec<CatalogRecord>> {
        Ok(self.records.clone())
    }
}
