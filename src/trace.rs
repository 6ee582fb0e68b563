// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Packet traces stored as JSONL, one `PacketRecord` per line.

use crate::packet::PacketRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends packet records to a JSONL trace file.
#[derive(Clone)]
pub struct TraceWriter {
    file: Arc<Mutex<tokio::fs::File>>,
}

impl TraceWriter {
    pub async fn new<P: Into<PathBuf>>(path: P) -> anyhow::Result<Self> {
        let path: PathBuf = path.into();
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            file: Arc::new(Mutex::new(f)),
        })
    }

    pub async fn write_packet(&self, record: &PacketRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

/// Load packet records from a JSONL trace.
///
/// Blank lines are ignored and malformed lines are skipped with a warning.
/// A missing file yields an empty trace.
pub async fn load_packets<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<PacketRecord>> {
    use tokio::io::AsyncBufReadExt;

    let path_ref = path.as_ref();
    if !tokio::fs::try_exists(path_ref).await.unwrap_or(false) {
        tracing::warn!(path = %path_ref.display(), "trace file not found, nothing to analyze");
        return Ok(Vec::new());
    }

    let file = tokio::fs::File::open(path_ref).await?;
    let mut lines = tokio::io::BufReader::new(file).lines();
    let mut records = Vec::new();
    let mut line_num = 0;

    while let Some(line) = lines.next_line().await? {
        line_num += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PacketRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "failed to parse packet record, skipping");
            }
        }
    }

    tracing::debug!(packets = records.len(), "trace loaded");
    Ok(records)
}
