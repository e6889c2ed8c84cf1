//! JSONL commit-event source adapter.
//!
//! Replays commit events from JSONL files (one JSON event per line) in
//! file order, useful for backfill and for exercising the pipeline
//! without a live firehose connection.

use super::{CommitSource, SourceStats};
use crate::{Error, Result};
use async_trait::async_trait;
use porchlight_core::CommitEvent;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Configuration for the JSONL source.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Input file or directory path.
    pub input: PathBuf,

    /// Continue processing on decode errors (log and skip bad lines).
    pub continue_on_error: bool,

    /// Limit number of files to process (for testing).
    pub limit: Option<usize>,

    /// Progress reporting interval (events).
    pub progress_interval: usize,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            continue_on_error: true,
            limit: None,
            progress_interval: 100_000,
        }
    }
}

/// JSONL file commit-event source.
pub struct JsonlSource {
    config: JsonlConfig,
}

impl JsonlSource {
    pub fn new(config: JsonlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JsonlConfig {
        &self.config
    }

    /// Collect files to process based on the input path.
    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let input = &self.config.input;
        let mut files = Vec::new();

        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut entries: Vec<_> = fs::read_dir(input)?
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let path = e.path();
                    path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext == "jsonl" || ext == "json" || ext == "ndjson")
                })
                .map(|e| e.path())
                .collect();

            // Sort for deterministic replay order
            entries.sort();
            files = entries;
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Input path does not exist: {}", input.display()),
            )));
        }

        if let Some(limit) = self.config.limit {
            files.truncate(limit);
        }

        Ok(files)
    }

    /// Replay a single JSONL file. Returns `false` when the receiver is
    /// gone and replay should stop.
    async fn process_file(
        &self,
        file_path: &PathBuf,
        resume_cursor: Option<i64>,
        tx: &mpsc::Sender<CommitEvent>,
        stats: &mut SourceStats,
    ) -> Result<bool> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!("Line {}: I/O error: {}", line_num + 1, e);
                    stats.decode_errors += 1;
                    if self.config.continue_on_error {
                        continue;
                    }
                    return Err(Error::Io(e));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let event = match serde_json::from_str::<CommitEvent>(&line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Line {}: JSON parse error: {}", line_num + 1, e);
                    stats.decode_errors += 1;
                    if self.config.continue_on_error {
                        continue;
                    }
                    return Err(Error::Json(e));
                }
            };

            // Already durably processed before the restart
            if resume_cursor.is_some_and(|cursor| event.seq <= cursor) {
                stats.events_skipped += 1;
                continue;
            }

            if tx.send(event).await.is_err() {
                tracing::info!("Event channel closed, stopping replay");
                return Ok(false);
            }
            stats.events_emitted += 1;

            if stats.events_emitted % self.config.progress_interval == 0 {
                tracing::info!(
                    "Progress: {} events emitted, {} skipped, {} decode errors",
                    stats.events_emitted,
                    stats.events_skipped,
                    stats.decode_errors
                );
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl CommitSource for JsonlSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn run(
        &mut self,
        resume_cursor: Option<i64>,
        tx: mpsc::Sender<CommitEvent>,
    ) -> Result<SourceStats> {
        let mut stats = SourceStats::default();

        let files = self.collect_files()?;
        tracing::info!("Found {} JSONL files to replay", files.len());

        for (file_idx, file_path) in files.iter().enumerate() {
            tracing::info!(
                "[{}/{}] Replaying: {}",
                file_idx + 1,
                files.len(),
                file_path.display()
            );

            match self.process_file(file_path, resume_cursor, &tx, &mut stats).await {
                Ok(true) => {
                    stats.files_processed += 1;
                }
                Ok(false) => {
                    stats.files_processed += 1;
                    break;
                }
                Err(e) => {
                    tracing::warn!("Error replaying {}: {}", file_path.display(), e);
                    if !self.config.continue_on_error {
                        return Err(e);
                    }
                }
            }
        }

        Ok(stats)
    }
}
