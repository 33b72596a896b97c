//! 💾 Snapshot vault.
//!
//! One JSON file per label; saving overwrites wholesale with a fresh
//! timestamp, loading never touches the network. No merging, no history -
//! last writer wins per label, and the caller decides when staleness
//! requires a refresh.

use crate::types::Snapshot;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct Vault {
    dir: PathBuf,
}

impl Vault {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Persist a snapshot under its label, replacing any prior one.
    /// Temp-file + rename so a crash mid-write never leaves a torn file.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.path_for(&snapshot.label)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create vault directory")?;
        }

        let contents =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, contents).context("Failed to write temp snapshot file")?;
        fs::rename(&temp_path, &path).context("Failed to rename snapshot file")?;

        info!("💾 Snapshot '{}' saved ({})", snapshot.label, path.display());
        Ok(())
    }

    /// Load the snapshot stored under `label`, if any.
    pub fn load(&self, label: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(label)?;
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).context("Failed to read snapshot file")?;
        let snapshot: Snapshot =
            serde_json::from_str(&contents).context("Failed to parse snapshot file")?;
        Ok(Some(snapshot))
    }

    fn path_for(&self, label: &str) -> Result<PathBuf> {
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "invalid snapshot label '{}' (alphanumeric, '-', '_' only)",
                label
            );
        }
        Ok(self.dir.join(format!("{}.json", label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScoreMatrix, Segment};
    use tempfile::tempdir;

    fn segment(name: &str) -> Segment {
        Segment {
            name: name.to_string(),
            code: "BK01".to_string(),
            change_pct: 1.0,
            net_inflow: 5_000_000.0,
            inflow_ratio_pct: 4.5,
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());

        let snapshot = Snapshot::new("daily", Some(vec![segment("semis")]), None);
        vault.save(&snapshot).unwrap();

        let loaded = vault.load("daily").unwrap().unwrap();
        assert_eq!(loaded.label, "daily");
        assert_eq!(loaded.segments.unwrap()[0].name, "semis");
        assert!(loaded.matrix.is_none());
    }

    #[test]
    fn test_load_absent_label() {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());
        assert!(vault.load("never-saved").unwrap().is_none());
    }

    #[test]
    fn test_same_label_overwrites_wholesale() {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());

        vault
            .save(&Snapshot::new("daily", Some(vec![segment("semis")]), None))
            .unwrap();
        let with_matrix = Snapshot::new(
            "daily",
            None,
            Some(ScoreMatrix {
                sessions: vec![],
                rows: vec![],
                interrupted: false,
            }),
        );
        vault.save(&with_matrix).unwrap();

        // No merging: the old segment list is gone
        let loaded = vault.load("daily").unwrap().unwrap();
        assert!(loaded.segments.is_none());
        assert!(loaded.matrix.is_some());
        assert!(loaded.created_at >= with_matrix.created_at);
    }

    #[test]
    fn test_labels_are_independent() {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());

        vault
            .save(&Snapshot::new("morning", Some(vec![segment("semis")]), None))
            .unwrap();
        vault
            .save(&Snapshot::new("close", Some(vec![segment("banks")]), None))
            .unwrap();

        assert_eq!(
            vault.load("morning").unwrap().unwrap().segments.unwrap()[0].name,
            "semis"
        );
        assert_eq!(
            vault.load("close").unwrap().unwrap().segments.unwrap()[0].name,
            "banks"
        );
    }

    #[test]
    fn test_bad_label_rejected() {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());

        assert!(vault.load("../escape").is_err());
        assert!(vault
            .save(&Snapshot::new("has space", None, None))
            .is_err());
        assert!(vault.load("").is_err());
    }
}
