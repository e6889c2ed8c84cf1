//! Per-event processing pipeline and cursor checkpointing.
//!
//! Each commit event moves through a fixed sequence: operation extraction,
//! the two index branches, one batched store write, cursor advance.
//!
//! ```text
//! CommitEvent
//!     │ extract_post_ops (post collection only)
//!     ▼
//! PostOps ──► keyword branch ──► FilteredPost rows ┐
//!        └──► classification branch ───────────────┤
//!             (links → handle → classify)          ▼
//!                                            MutationBatch
//!                                                  │ deletes, then upserts
//!                                                  ▼
//!                                              IndexStore
//! ```
//!
//! The two branches are independent pure reducers over the same create
//! list: a post matching both lands in both tables. Events are processed
//! strictly one at a time, so no cross-event locking is needed anywhere in
//! the pipeline.

use crate::classify::Classifier;
use crate::error::Result;
use crate::registry::DomainRegistry;
use crate::resolver::HandleResolver;
use crate::store::{FilteredPost, IndexStore, MutationBatch, SitePost};
use chrono::Utc;
use porchlight_core::event::{CommitEvent, PostOps};
use porchlight_core::{extract_links, extract_post_ops, KEYWORD_MARKER};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Configuration for the indexer pipeline.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Logical subscription id; keys the cursor row.
    pub stream_id: String,

    /// Durable cursor write every N events.
    pub checkpoint_interval: u64,

    /// Case-insensitive marker for the keyword branch.
    pub keyword_marker: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            stream_id: "firehose".to_string(),
            checkpoint_interval: 20,
            keyword_marker: KEYWORD_MARKER.to_string(),
        }
    }
}

/// Counters for one processing run.
#[derive(Debug, Clone, Default)]
pub struct IndexerStats {
    pub events_processed: u64,
    pub filtered_indexed: u64,
    pub site_indexed: u64,
    pub deleted: u64,
    pub resolver_misses: u64,
}

/// The streaming index maintainer.
///
/// Owns the classification pipeline and the cursor position. Exactly one
/// indexer consumes a given event channel; ordering across events follows
/// from that single consumer.
pub struct Indexer {
    config: IndexerConfig,
    store: Arc<IndexStore>,
    resolver: HandleResolver,
    classifier: Classifier,
    keyword_marker: String,
    position: Option<i64>,
    events_since_checkpoint: u64,
    stats: IndexerStats,
}

impl Indexer {
    /// Build an indexer, loading the persisted resume position for the
    /// configured stream.
    pub fn new(
        config: IndexerConfig,
        store: Arc<IndexStore>,
        registry: Arc<DomainRegistry>,
        resolver: HandleResolver,
    ) -> Result<Self> {
        let position = store.load_cursor(&config.stream_id)?;
        if let Some(position) = position {
            tracing::info!(stream = %config.stream_id, position, "resuming from persisted cursor");
        } else {
            tracing::info!(stream = %config.stream_id, "no persisted cursor, starting fresh");
        }

        let keyword_marker = config.keyword_marker.to_ascii_lowercase();

        Ok(Self {
            config,
            store,
            resolver,
            classifier: Classifier::new(registry),
            keyword_marker,
            position,
            events_since_checkpoint: 0,
            stats: IndexerStats::default(),
        })
    }

    /// The position to hand the transport at startup.
    pub fn resume_cursor(&self) -> Option<i64> {
        self.position
    }

    /// Stats for the current run.
    pub fn stats(&self) -> &IndexerStats {
        &self.stats
    }

    /// Consume events until the channel closes, then flush the cursor.
    ///
    /// Each event is fully classified and persisted before the next one is
    /// taken off the channel.
    pub async fn run(&mut self, events: &mut mpsc::Receiver<CommitEvent>) -> Result<IndexerStats> {
        while let Some(event) = events.recv().await {
            self.handle_event(&event).await?;
        }
        self.checkpoint();
        Ok(self.stats.clone())
    }

    /// Process one commit event end to end.
    ///
    /// Store failures propagate (fatal for the core; the supervisor
    /// restarts the process). Everything else is absorbed per the error
    /// taxonomy: bad records, resolver failures, and unparseable links
    /// only skip their own unit of work.
    pub async fn handle_event(&mut self, event: &CommitEvent) -> Result<()> {
        let ops = extract_post_ops(event);

        if !ops.is_empty() {
            metrics::counter!("ingest_posts_created_total").increment(ops.creates.len() as u64);
            metrics::counter!("ingest_posts_deleted_total").increment(ops.deletes.len() as u64);

            let now = Utc::now().to_rfc3339();
            let filtered = keyword_reduce(&ops, &self.keyword_marker, &now);
            let site = self.classification_reduce(&ops, &now).await;
            let batch = assemble_batch(ops, filtered, site);

            if !batch.is_empty() {
                self.stats.filtered_indexed += batch.filtered.len() as u64;
                self.stats.site_indexed += batch.site.len() as u64;
                self.stats.deleted += batch.deletes.len() as u64;

                metrics::counter!("index_filtered_total").increment(batch.filtered.len() as u64);
                metrics::counter!("index_site_total").increment(batch.site.len() as u64);
                metrics::counter!("index_deleted_total").increment(batch.deletes.len() as u64);

                self.store.apply(&batch)?;
            }
        }

        self.advance_cursor(event.seq);
        self.stats.events_processed += 1;
        metrics::counter!("ingest_events_total").increment(1);
        Ok(())
    }

    /// Classification branch: links → resolved handle → classifier.
    ///
    /// Posts without links are skipped before the resolver is consulted;
    /// unresolved authors are skipped after.
    async fn classification_reduce(&mut self, ops: &PostOps, now: &str) -> Vec<SitePost> {
        let mut rows = Vec::new();

        for post in &ops.creates {
            let links = extract_links(&post.record);
            if links.is_empty() {
                continue;
            }

            let did = author_did(&post.uri);
            let Some(handle) = self.resolver.resolve_handle(did).await else {
                self.stats.resolver_misses += 1;
                continue;
            };

            if self.classifier.classify(&handle, &links) {
                rows.push(SitePost {
                    uri: post.uri.clone(),
                    cid: post.cid.clone(),
                    handle,
                    indexed_at: now.to_string(),
                });
            }
        }

        rows
    }

    /// Advance the stream position and flush it every Nth event.
    ///
    /// Checkpoint writes are best-effort: a failure is logged and the
    /// counter resets so the next attempt happens an interval later. The
    /// worst case on crash is reprocessing the last unflushed batch, which
    /// the idempotent store makes safe.
    fn advance_cursor(&mut self, seq: i64) {
        self.position = Some(self.position.map_or(seq, |p| p.max(seq)));
        metrics::gauge!("cursor_position").set(seq as f64);

        self.events_since_checkpoint += 1;
        if self.events_since_checkpoint >= self.config.checkpoint_interval {
            self.checkpoint();
        }
    }

    /// Flush the current position to the store (best-effort).
    pub fn checkpoint(&mut self) {
        self.events_since_checkpoint = 0;
        let Some(position) = self.position else {
            return;
        };

        match self.store.save_cursor(&self.config.stream_id, position) {
            Ok(()) => {
                metrics::counter!("cursor_checkpoints_total").increment(1);
                tracing::debug!(stream = %self.config.stream_id, position, "cursor checkpointed");
            }
            Err(e) => {
                tracing::warn!(
                    stream = %self.config.stream_id,
                    position,
                    error = %e,
                    "cursor checkpoint failed, continuing"
                );
            }
        }
    }
}

/// Keyword branch: pure reducer over the create list.
fn keyword_reduce(ops: &PostOps, marker: &str, now: &str) -> Vec<FilteredPost> {
    ops.creates
        .iter()
        .filter(|post| post.record.text.to_ascii_lowercase().contains(marker))
        .map(|post| FilteredPost {
            uri: post.uri.clone(),
            cid: post.cid.clone(),
            indexed_at: now.to_string(),
        })
        .collect()
}

/// Combine branch outputs into one store batch.
///
/// A uri that is both created and deleted within the same event stays
/// deleted: the staged inserts are dropped so the event nets out to no row.
fn assemble_batch(ops: PostOps, filtered: Vec<FilteredPost>, site: Vec<SitePost>) -> MutationBatch {
    let deleted: HashSet<&str> = ops.deletes.iter().map(String::as_str).collect();
    let filtered = filtered
        .into_iter()
        .filter(|post| !deleted.contains(post.uri.as_str()))
        .collect();
    let site = site
        .into_iter()
        .filter(|post: &SitePost| !deleted.contains(post.uri.as_str()))
        .collect();

    MutationBatch {
        deletes: ops.deletes,
        filtered,
        site,
    }
}

/// Author DID of an `at://did/collection/rkey` uri.
fn author_did(uri: &str) -> &str {
    uri.strip_prefix(porchlight_core::AT_URI_PREFIX)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DomainRegistry, RegistryConfig};
    use crate::resolver::testing::StaticResolver;
    use porchlight_core::event::{OpAction, RepoOp};
    use porchlight_core::POST_COLLECTION;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_op(rkey: &str, record: serde_json::Value) -> RepoOp {
        RepoOp {
            action: OpAction::Create,
            path: format!("{}/{}", POST_COLLECTION, rkey),
            cid: Some(format!("cid-{}", rkey)),
            record: Some(record),
        }
    }

    fn delete_op(rkey: &str) -> RepoOp {
        RepoOp {
            action: OpAction::Delete,
            path: format!("{}/{}", POST_COLLECTION, rkey),
            cid: None,
            record: None,
        }
    }

    fn event(seq: i64, ops: Vec<RepoOp>) -> CommitEvent {
        CommitEvent {
            seq,
            repo: "did:plc:author".to_string(),
            time: None,
            ops,
        }
    }

    fn linked_record(text: &str, link: &str) -> serde_json::Value {
        json!({
            "text": text,
            "facets": [{
                "features": [{
                    "$type": "app.bsky.richtext.facet#link",
                    "uri": link
                }]
            }]
        })
    }

    struct Fixture {
        store: Arc<IndexStore>,
        resolver_calls: Arc<StaticResolver>,
        indexer: Indexer,
        _dir: Option<TempDir>,
    }

    fn fixture_with(
        resolver: StaticResolver,
        mapping: Option<&str>,
        config: IndexerConfig,
    ) -> Fixture {
        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        fixture_on(store, resolver, mapping, config)
    }

    fn fixture_on(
        store: Arc<IndexStore>,
        resolver: StaticResolver,
        mapping: Option<&str>,
        config: IndexerConfig,
    ) -> Fixture {
        let (dir, registry) = match mapping {
            Some(contents) => {
                let dir = TempDir::new().unwrap();
                let path = dir.path().join("domains.csv");
                let mut file = std::fs::File::create(&path).unwrap();
                file.write_all(contents.as_bytes()).unwrap();
                let registry = Arc::new(DomainRegistry::new(RegistryConfig {
                    path,
                    ..Default::default()
                }));
                registry.load();
                (Some(dir), registry)
            }
            None => (None, Arc::new(DomainRegistry::new(RegistryConfig::default()))),
        };

        let resolver = Arc::new(resolver);
        let indexer = Indexer::new(
            config,
            Arc::clone(&store),
            registry,
            HandleResolver::new(Arc::clone(&resolver) as Arc<dyn crate::resolver::DidResolver>),
        )
        .unwrap();

        Fixture {
            store,
            resolver_calls: resolver,
            indexer,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_same_event_twice_is_idempotent() {
        let mut fx = fixture_with(
            StaticResolver::with_handle("dominik.social"),
            None,
            IndexerConfig::default(),
        );

        let ev = event(
            1,
            vec![create_op(
                "aaa",
                linked_record("an indieweb post", "https://dominik.social/p/1"),
            )],
        );

        fx.indexer.handle_event(&ev).await.unwrap();
        fx.indexer.handle_event(&ev).await.unwrap();

        assert_eq!(fx.store.filtered_count().unwrap(), 1);
        assert_eq!(fx.store.site_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_then_delete_in_one_event_leaves_no_row() {
        let mut fx = fixture_with(
            StaticResolver::with_handle("dominik.social"),
            None,
            IndexerConfig::default(),
        );

        let ev = event(
            1,
            vec![
                create_op(
                    "aaa",
                    linked_record("indieweb", "https://dominik.social/p/1"),
                ),
                delete_op("aaa"),
            ],
        );
        fx.indexer.handle_event(&ev).await.unwrap();

        assert_eq!(fx.store.filtered_count().unwrap(), 0);
        assert_eq!(fx.store.site_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_rows_from_both_tables() {
        let mut fx = fixture_with(
            StaticResolver::with_handle("dominik.social"),
            None,
            IndexerConfig::default(),
        );

        fx.indexer
            .handle_event(&event(
                1,
                vec![create_op(
                    "aaa",
                    linked_record("indieweb", "https://dominik.social/p/1"),
                )],
            ))
            .await
            .unwrap();
        assert_eq!(fx.store.filtered_count().unwrap(), 1);
        assert_eq!(fx.store.site_count().unwrap(), 1);

        fx.indexer
            .handle_event(&event(2, vec![delete_op("aaa")]))
            .await
            .unwrap();
        assert_eq!(fx.store.filtered_count().unwrap(), 0);
        assert_eq!(fx.store.site_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_post_without_links_never_calls_resolver() {
        let mut fx = fixture_with(
            StaticResolver::with_handle("dominik.social"),
            None,
            IndexerConfig::default(),
        );

        fx.indexer
            .handle_event(&event(
                1,
                vec![create_op("aaa", json!({"text": "no links here"}))],
            ))
            .await
            .unwrap();

        assert_eq!(fx.resolver_calls.call_count(), 0);
        assert_eq!(fx.store.site_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_author_skips_classification() {
        let mut fx = fixture_with(StaticResolver::unresolved(), None, IndexerConfig::default());

        fx.indexer
            .handle_event(&event(
                1,
                vec![create_op(
                    "aaa",
                    linked_record("post", "https://somewhere.example/p"),
                )],
            ))
            .await
            .unwrap();

        assert_eq!(fx.resolver_calls.call_count(), 1);
        assert_eq!(fx.store.site_count().unwrap(), 0);
        assert_eq!(fx.indexer.stats().resolver_misses, 1);
    }

    #[tokio::test]
    async fn test_keyword_branch_is_case_insensitive() {
        let mut fx = fixture_with(StaticResolver::unresolved(), None, IndexerConfig::default());

        fx.indexer
            .handle_event(&event(
                1,
                vec![create_op("aaa", json!({"text": "Proud IndieWeb citizen"}))],
            ))
            .await
            .unwrap();

        assert_eq!(fx.store.filtered_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_registry_mapping_admits_shared_host_author() {
        let mut fx = fixture_with(
            StaticResolver::with_handle("alice.bsky.social"),
            Some("alice.bsky.social,blog.example.com\n"),
            IndexerConfig::default(),
        );

        fx.indexer
            .handle_event(&event(
                1,
                vec![create_op(
                    "aaa",
                    linked_record("new post up", "https://blog.example.com/p/1"),
                )],
            ))
            .await
            .unwrap();

        assert_eq!(fx.store.site_count().unwrap(), 1);
        assert!(fx
            .store
            .site_contains("at://did:plc:author/app.bsky.feed.post/aaa")
            .unwrap());
    }

    #[tokio::test]
    async fn test_shared_host_self_link_rejected() {
        let mut fx = fixture_with(
            StaticResolver::with_handle("alice.bsky.social"),
            None,
            IndexerConfig::default(),
        );

        fx.indexer
            .handle_event(&event(
                1,
                vec![create_op(
                    "aaa",
                    linked_record("me", "https://alice.bsky.social/profile"),
                )],
            ))
            .await
            .unwrap();

        assert_eq!(fx.store.site_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_checkpoint_interval_and_resume_without_duplicates() {
        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let config = IndexerConfig {
            checkpoint_interval: 20,
            ..Default::default()
        };

        let mut fx = fixture_on(
            Arc::clone(&store),
            StaticResolver::with_handle("dominik.social"),
            None,
            config.clone(),
        );

        // 25 events: only the 20th triggers a durable cursor write
        for seq in 1..=25 {
            let ev = event(
                seq,
                vec![create_op(
                    &format!("post-{}", seq),
                    linked_record("indieweb", "https://dominik.social/p"),
                )],
            );
            fx.indexer.handle_event(&ev).await.unwrap();
        }
        assert_eq!(store.load_cursor("firehose").unwrap(), Some(20));
        assert_eq!(fx.store.filtered_count().unwrap(), 25);

        // Simulated crash: a fresh indexer on the same store resumes from
        // the flushed position and reprocesses events 21..=25
        let mut fx2 = fixture_on(
            Arc::clone(&store),
            StaticResolver::with_handle("dominik.social"),
            None,
            config,
        );
        assert_eq!(fx2.indexer.resume_cursor(), Some(20));

        for seq in 21..=25 {
            let ev = event(
                seq,
                vec![create_op(
                    &format!("post-{}", seq),
                    linked_record("indieweb", "https://dominik.social/p"),
                )],
            );
            fx2.indexer.handle_event(&ev).await.unwrap();
        }

        // Reprocessing produced no duplicate rows
        assert_eq!(store.filtered_count().unwrap(), 25);
        assert_eq!(store.site_count().unwrap(), 25);
    }

    #[tokio::test]
    async fn test_final_checkpoint_on_channel_close() {
        let mut fx = fixture_with(
            StaticResolver::unresolved(),
            None,
            IndexerConfig {
                checkpoint_interval: 100,
                ..Default::default()
            },
        );

        let (tx, mut rx) = mpsc::channel(8);
        for seq in 1..=3 {
            tx.send(event(seq, vec![])).await.unwrap();
        }
        drop(tx);

        let stats = fx.indexer.run(&mut rx).await.unwrap();
        assert_eq!(stats.events_processed, 3);
        // run() flushes the cursor even though the interval never elapsed
        assert_eq!(fx.store.load_cursor("firehose").unwrap(), Some(3));
    }

    #[test]
    fn test_author_did_extraction() {
        assert_eq!(
            author_did("at://did:plc:abc/app.bsky.feed.post/3k"),
            "did:plc:abc"
        );
    }
}
