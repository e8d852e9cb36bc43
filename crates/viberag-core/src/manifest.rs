//! On-disk manifest (spec §3, §6).
//!
//! A single JSON record persisted beside the store, serialized with tab
//! indentation and a trailing newline for bit-exact compatibility, and
//! written atomically (temp file, fsync, rename).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::merkle::MerkleTree;

/// Current schema version. Bump whenever a row shape in the store changes
/// in a way that requires dropping and repopulating tables.
pub const SCHEMA_VERSION: u32 = 2;

/// Current manifest format version (the manifest's own envelope shape,
/// independent of the row schema it describes).
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestStats {
    pub total_files: usize,
    pub total_symbols: usize,
    pub total_chunks: usize,
    pub total_refs: usize,
}

/// One batch's embedding failure, kept so a later `index` can retry it
/// without re-scanning the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedBatch {
    pub chunk_count: usize,
    pub files: Vec<String>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// One file that failed to index, keyed by its bare relative path so
/// `clear_failed_for_file` can match it by equality once the file is
/// re-indexed or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub file_path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merkle_tree: Option<MerkleTree>,
    pub stats: ManifestStats,
    pub failed_files: Vec<FailedFile>,
    pub failed_batches: Vec<FailedBatch>,
}

impl Manifest {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            format_version: FORMAT_VERSION,
            schema_version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
            merkle_tree: None,
            stats: ManifestStats::default(),
            failed_files: Vec::new(),
            failed_batches: Vec::new(),
        }
    }

    /// Load a manifest from `path`. Returns `Ok(None)` if it doesn't exist
    /// yet (first run).
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        Ok(Some(manifest))
    }

    /// Check whether this manifest's schema is recent enough for the
    /// running implementation; if not, the caller must force a reindex
    /// (the store may be dropped).
    pub fn requires_reindex(&self) -> bool {
        self.schema_version < SCHEMA_VERSION
    }

    pub fn verify_schema(&self) -> Result<()> {
        if self.requires_reindex() {
            return Err(CoreError::SchemaVersionMismatch {
                found: self.schema_version,
                required: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Write atomically: temp file beside `path`, fsync, rename.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut serialized = serde_json::to_string_pretty(self)?;
        // serde_json's pretty printer uses two spaces; the spec calls for
        // tab indentation, so re-indent.
        serialized = reindent_with_tabs(&serialized);
        serialized.push('\n');

        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(serialized.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn clear_failed_for_file(&mut self, file_path: &str) {
        self.failed_files.retain(|f| f.file_path != file_path);
        self.failed_batches.retain(|b| !b.files.iter().any(|f| f == file_path));
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

fn reindent_with_tabs(json: &str) -> String {
    json.lines()
        .map(|line| {
            let trimmed = line.trim_start_matches(' ');
            let leading_spaces = line.len() - trimmed.len();
            let tabs = "\t".repeat(leading_spaces / 2);
            format!("{}{}", tabs, trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_manifest_does_not_require_reindex() {
        let m = Manifest::new();
        assert!(!m.requires_reindex());
    }

    #[test]
    fn old_schema_requires_reindex() {
        let mut m = Manifest::new();
        m.schema_version = 1;
        assert!(m.requires_reindex());
        assert!(m.verify_schema().is_err());
    }

    #[test]
    fn load_missing_manifest_returns_none() {
        let dir = TempDir::new().unwrap();
        let loaded = Manifest::load(&dir.path().join("manifest.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn round_trip_save_load_preserves_stats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");

        let mut m = Manifest::new();
        m.stats.total_files = 42;
        m.save(&path).unwrap();

        let reloaded = Manifest::load(&path).unwrap().unwrap();
        assert_eq!(reloaded.stats.total_files, 42);
        assert_eq!(reloaded.schema_version, m.schema_version);
    }

    #[test]
    fn saved_file_uses_tab_indentation_and_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        Manifest::new().save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        assert!(raw.lines().any(|l| l.starts_with('\t')));
    }

    #[test]
    fn clear_failed_for_file_removes_matching_entries() {
        let mut m = Manifest::new();
        m.failed_files.push(FailedFile { file_path: "a.py".into(), error: "boom".into() });
        m.failed_files.push(FailedFile { file_path: "b.py".into(), error: "boom".into() });
        m.failed_batches.push(FailedBatch {
            chunk_count: 2,
            files: vec!["a.py".into()],
            error: "boom".into(),
            timestamp: Utc::now(),
        });

        m.clear_failed_for_file("a.py");
        assert_eq!(m.failed_files.iter().map(|f| f.file_path.as_str()).collect::<Vec<_>>(), vec!["b.py"]);
        assert!(m.failed_batches.is_empty());
    }
}
