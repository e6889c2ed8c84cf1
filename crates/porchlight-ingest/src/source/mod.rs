//! Commit-event source adapters.
//!
//! A source produces decoded [`CommitEvent`]s and pushes them into the
//! channel the indexer consumes. Each source is responsible for:
//!
//! 1. Reading/receiving raw events from its underlying transport
//! 2. Decoding them into [`CommitEvent`]s (skipping the malformed)
//! 3. Honoring the resume cursor: events at or below it are not emitted
//!
//! The indexer is the channel's single consumer, so the channel order is
//! the mutation order — sources never reorder within their stream.
//!
//! # Available Sources
//!
//! - [`JsonlSource`] - Replays JSONL files (one JSON event per line)

mod jsonl;

pub use jsonl::{JsonlConfig, JsonlSource};

use crate::Result;
use async_trait::async_trait;
use porchlight_core::CommitEvent;
use tokio::sync::mpsc;

/// A source of commit events.
#[async_trait]
pub trait CommitSource: Send {
    /// Human-readable name for this source (used in logs and metrics).
    fn name(&self) -> &'static str;

    /// Deliver events into `tx` until the source is exhausted or the
    /// receiver is dropped.
    ///
    /// `resume_cursor` is the last durably-processed sequence number;
    /// events with `seq <= resume_cursor` must be skipped. A dropped
    /// receiver is a graceful stop, not an error.
    async fn run(
        &mut self,
        resume_cursor: Option<i64>,
        tx: mpsc::Sender<CommitEvent>,
    ) -> Result<SourceStats>;
}

/// Statistics from one source run.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    /// Events delivered into the channel.
    pub events_emitted: usize,

    /// Events skipped because of the resume cursor.
    pub events_skipped: usize,

    /// Lines/frames that failed to decode.
    pub decode_errors: usize,

    /// For file-based sources: number of files processed.
    pub files_processed: usize,
}
