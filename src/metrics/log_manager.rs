//! Per-model metrics recording with bounded memory
//!
//! Records accumulate in memory per model key. When the total crosses
//! `max_log_length`, each model's slice is archived to
//! `<root>/<sanitized_key>/<start>-<end>.json` and dropped from memory;
//! per-model archives are capped at `max_log_archive_files`, oldest
//! deleted first. Queries serve from memory and backfill from archives.
//! JSON encode/decode and stats run on the blocking pool so the
//! cooperative scheduler never stalls on disk work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use tokio::sync::Mutex;
use tracing::{error, warn};

use super::metrics::ModelMetrics;
use super::stats::{LogStats, compute_stats};
use crate::utils::error::{LlmError, Result};

const DEFAULT_MAX_LOG_LENGTH: usize = 1000;
const DEFAULT_MAX_ARCHIVE_FILES: usize = 100;

/// Process-wide recorder of per-call metrics
pub struct LogManager {
    logs: Mutex<HashMap<String, Vec<ModelMetrics>>>,
    root_dir: PathBuf,
    max_log_length: usize,
    max_log_archive_files: usize,
}

impl LogManager {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        max_log_length: usize,
        max_log_archive_files: usize,
    ) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            root_dir: root_dir.into(),
            max_log_length,
            max_log_archive_files,
        }
    }

    /// Default layout: `metrics/` under the working directory
    pub fn with_defaults() -> Self {
        Self::new("metrics", DEFAULT_MAX_LOG_LENGTH, DEFAULT_MAX_ARCHIVE_FILES)
    }

    /// Append one record; archives everything when the in-memory total
    /// crosses the bound.
    pub async fn add_log(&self, model_key: &str, record: ModelMetrics) -> Result<()> {
        let mut logs = self.logs.lock().await;
        logs.entry(model_key.to_string()).or_default().push(record);

        let total: usize = logs.values().map(Vec::len).sum();
        if total > self.max_log_length {
            self.archive_all(&mut logs).await?;
        }
        Ok(())
    }

    /// Model keys currently known in memory
    pub async fn get_models(&self) -> Vec<String> {
        self.logs.lock().await.keys().cloned().collect()
    }

    /// Archive every in-memory record unconditionally. Called on
    /// shutdown.
    pub async fn flush(&self) -> Result<()> {
        let mut logs = self.logs.lock().await;
        self.archive_all(&mut logs).await
    }

    /// Time-windowed query, newest first, with on-the-fly aggregates.
    ///
    /// Memory is snapshotted under the mutex and the lock released before
    /// any disk I/O; archives are consulted only to fill the gap up to
    /// `limit`.
    pub async fn get_logs(
        &self,
        model_key: &str,
        start_time: Option<f64>,
        end_time: Option<f64>,
        limit: usize,
    ) -> Result<(LogStats, Vec<ModelMetrics>)> {
        let mut selected: Vec<ModelMetrics> = {
            let logs = self.logs.lock().await;
            logs.get(model_key)
                .map(|records| {
                    records
                        .iter()
                        .filter(|r| in_window(r, start_time, end_time))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        selected.sort_by(|a, b| b.call_start_time.total_cmp(&a.call_start_time));

        if selected.len() < limit {
            let deficit = limit - selected.len();
            let archived = self
                .read_archived(model_key, start_time, end_time, deficit)
                .await?;
            selected.extend(archived);
            selected.sort_by(|a, b| b.call_start_time.total_cmp(&a.call_start_time));
        }
        selected.truncate(limit);

        let for_stats = selected.clone();
        let stats = tokio::task::spawn_blocking(move || compute_stats(&for_stats))
            .await
            .map_err(|e| LlmError::service_call(format!("stats task failed: {e}")))?;
        Ok((stats, selected))
    }

    /// Archive each non-empty key and clear memory; enforce per-model
    /// archive retention afterwards.
    async fn archive_all(&self, logs: &mut HashMap<String, Vec<ModelMetrics>>) -> Result<()> {
        for (model_key, records) in logs.iter_mut() {
            if records.is_empty() {
                continue;
            }
            let mut sorted = std::mem::take(records);
            sorted.sort_by(|a, b| a.call_start_time.total_cmp(&b.call_start_time));

            let dir = self.root_dir.join(sanitize_key(model_key));
            let first = sorted.first().expect("non-empty").call_start_time;
            let last = sorted.last().expect("non-empty").call_start_time;
            let filename = dir.join(format!(
                "{}-{}.json",
                timestamp_str(first),
                timestamp_str(last)
            ));

            let max_archive_files = self.max_log_archive_files;
            let written = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                std::fs::create_dir_all(&dir)?;
                let encoded = serde_json::to_vec(&sorted)?;
                std::fs::write(&filename, encoded)?;
                prune_archives(&dir, max_archive_files);
                Ok(())
            })
            .await
            .map_err(|e| LlmError::service_call(format!("archive task failed: {e}")))?;

            if let Err(e) = written {
                error!(%model_key, "failed to archive metrics: {e}");
            }
        }
        Ok(())
    }

    async fn read_archived(
        &self,
        model_key: &str,
        start_time: Option<f64>,
        end_time: Option<f64>,
        limit: usize,
    ) -> Result<Vec<ModelMetrics>> {
        let dir = self.root_dir.join(sanitize_key(model_key));
        if !dir.exists() || limit == 0 {
            return Ok(Vec::new());
        }

        let collected = tokio::task::spawn_blocking(move || {
            let mut collected: Vec<ModelMetrics> = Vec::new();
            for path in archive_files_newest_first(&dir) {
                if collected.len() >= limit {
                    break;
                }
                let records: Vec<ModelMetrics> = match std::fs::read(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
                {
                    Ok(records) => records,
                    Err(e) => {
                        warn!("skipping unreadable archive {}: {e}", path.display());
                        continue;
                    }
                };
                for record in records {
                    if collected.len() >= limit {
                        break;
                    }
                    if in_window(&record, start_time, end_time) {
                        collected.push(record);
                    }
                }
            }
            collected.sort_by(|a, b| b.call_start_time.total_cmp(&a.call_start_time));
            collected.truncate(limit);
            collected
        })
        .await
        .map_err(|e| LlmError::service_call(format!("archive read task failed: {e}")))?;

        Ok(collected)
    }
}

fn in_window(record: &ModelMetrics, start_time: Option<f64>, end_time: Option<f64>) -> bool {
    if let Some(start) = start_time {
        if record.call_start_time < start {
            return false;
        }
    }
    if let Some(end) = end_time {
        if record.call_start_time > end {
            return false;
        }
    }
    true
}

/// Replace filesystem-unsafe characters with underscores
fn sanitize_key(model_key: &str) -> String {
    model_key
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

fn timestamp_str(unix_seconds: f64) -> String {
    Local
        .timestamp_opt(unix_seconds as i64, 0)
        .single()
        .map(|t| t.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| "00000000000000".to_string())
}

fn archive_files_newest_first(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<(PathBuf, std::time::SystemTime)> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|entry| {
                    entry.path().extension().is_some_and(|ext| ext == "json")
                })
                .filter_map(|entry| {
                    let modified = entry.metadata().ok()?.modified().ok()?;
                    Some((entry.path(), modified))
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort_by(|a, b| b.1.cmp(&a.1));
    files.into_iter().map(|(path, _)| path).collect()
}

/// Keep the most recent `max_files` archives, delete the rest
fn prune_archives(dir: &Path, max_files: usize) {
    let files = archive_files_newest_first(dir);
    for path in files.iter().skip(max_files) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("failed to delete old archive {}: {e}", path.display());
        }
    }
}
