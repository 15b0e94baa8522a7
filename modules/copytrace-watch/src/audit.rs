//! Append-only audit log: one JSONL record per published report entry,
//! kept under `{DATA_DIR}/audit/`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Root data directory, controlled by `DATA_DIR` (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

#[derive(Debug, Serialize)]
pub struct AuditRecord {
    pub revision_id: u64,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub namespace: i64,
    pub job_id: String,
    pub rendered_sources: String,
}

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// One log file per language/report combination.
    pub fn open(lang: &str) -> Result<Self> {
        let dir = data_dir().join("audit");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{lang}-report-log.jsonl"));
        Ok(Self { path })
    }

    #[cfg(test)]
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        info!(
            rev = record.revision_id,
            title = %record.title,
            "audit record appended"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::at_path(dir.path().join("log.jsonl"));
        for rev in [1_u64, 2] {
            log.append(&AuditRecord {
                revision_id: rev,
                timestamp: Utc::now(),
                title: "Sample".to_string(),
                namespace: 0,
                job_id: "j1".to_string(),
                rendered_sources: "* source".to_string(),
            })
            .unwrap();
        }
        let content = std::fs::read_to_string(dir.path().join("log.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first["revision_id"], 1);
    }
}
