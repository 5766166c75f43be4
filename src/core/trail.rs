//! Append-only persistence for sealed audit trails.
//!
//! Trails are stored as newline-delimited JSON (JSONL), one
//! self-describing line per record entry framed by a header and a seal
//! line, for easy inspection and append-only storage. Only sealed
//! records are persisted; the orchestrator itself never touches disk.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{PipelineRecord, SealedOutcome, StageEntry};

/// One line of a persisted trail.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "line", rename_all = "snake_case")]
enum TrailLine {
    Header {
        run_id: Uuid,
        query_snapshot: String,
        query_digest: String,
        started_at: DateTime<Utc>,
    },
    Entry(StageEntry),
    Seal {
        outcome: SealedOutcome,
        sealed_at: DateTime<Utc>,
    },
}

/// File-based trail store, one directory per run.
pub struct TrailStore {
    base_dir: PathBuf,
}

impl TrailStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn trail_path(&self, run_id: Uuid) -> PathBuf {
        self.base_dir.join(run_id.to_string()).join("trail.jsonl")
    }

    /// Persist a sealed record. Refuses unsealed records and refuses to
    /// overwrite an existing trail.
    pub async fn save(&self, record: &PipelineRecord) -> Result<PathBuf> {
        let (outcome, sealed_at) = match (record.outcome, record.sealed_at) {
            (Some(outcome), Some(sealed_at)) => (outcome, sealed_at),
            _ => bail!("refusing to persist an unsealed record"),
        };

        let dir = self.base_dir.join(record.run_id.to_string());
        let path = dir.join("trail.jsonl");
        if fs::metadata(&path).await.is_ok() {
            bail!("trail for run {} already persisted", record.run_id);
        }

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create run directory: {}", dir.display()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open trail file: {}", path.display()))?;

        let mut lines = Vec::with_capacity(record.entries.len() + 2);
        lines.push(TrailLine::Header {
            run_id: record.run_id,
            query_snapshot: record.query_snapshot.clone(),
            query_digest: record.query_digest.clone(),
            started_at: record.started_at,
        });
        lines.extend(record.entries.iter().cloned().map(TrailLine::Entry));
        lines.push(TrailLine::Seal { outcome, sealed_at });

        for line in &lines {
            let json = serde_json::to_string(line).context("failed to serialize trail line")?;
            file.write_all(format!("{}\n", json).as_bytes())
                .await
                .context("failed to write trail line")?;
        }
        file.flush().await.context("failed to flush trail")?;

        Ok(path)
    }

    /// Load a persisted trail back into a sealed record.
    pub async fn load(&self, run_id: Uuid) -> Result<PipelineRecord> {
        let path = self.trail_path(run_id);
        let file = File::open(&path)
            .await
            .with_context(|| format!("failed to open trail file: {}", path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let mut record: Option<PipelineRecord> = None;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let parsed: TrailLine = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse trail line: {}", line))?;

            match parsed {
                TrailLine::Header {
                    run_id,
                    query_snapshot,
                    query_digest,
                    started_at,
                } => {
                    if record.is_some() {
                        bail!("trail file {} has multiple headers", path.display());
                    }
                    record = Some(PipelineRecord {
                        run_id,
                        query_snapshot,
                        query_digest,
                        started_at,
                        entries: Vec::new(),
                        outcome: None,
                        sealed_at: None,
                    });
                }
                TrailLine::Entry(entry) => match record.as_mut() {
                    Some(record) => record.entries.push(entry),
                    None => bail!("trail file {} is malformed", path.display()),
                },
                TrailLine::Seal { outcome, sealed_at } => match record.as_mut() {
                    Some(record) => {
                        record.outcome = Some(outcome);
                        record.sealed_at = Some(sealed_at);
                    }
                    None => bail!("trail file {} is malformed", path.display()),
                },
            }
        }

        let record = record.with_context(|| format!("trail file {} is empty", path.display()))?;
        if !record.is_sealed() {
            bail!("trail file {} has no seal line", path.display());
        }

        Ok(record)
    }

    /// List persisted run ids.
    pub async fn list_runs(&self) -> Result<Vec<Uuid>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}
