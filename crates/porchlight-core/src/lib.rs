//! Core types and shared utilities for the Porchlight indexer.
//!
//! This crate provides:
//! - The decoded commit-event model and typed post-operation extraction
//! - Pure link extraction from post records
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod event;
pub mod links;
pub mod metrics;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Record collection for posts; the only collection the indexer consumes.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// URI scheme prefix for repository records and identity aliases.
pub const AT_URI_PREFIX: &str = "at://";

/// Shared-hosting handle suffix. Accounts on the platform's free identity
/// service end with this; they cannot claim their own handle as a personal
/// domain without an explicit mapping entry.
pub const SHARED_HOST_SUFFIX: &str = ".bsky.social";

/// Case-insensitive marker the keyword-filter branch looks for in post text.
pub const KEYWORD_MARKER: &str = "indieweb";

pub use error::{Error, Result};
pub use event::{
    extract_post_ops, split_op_path, CommitEvent, OpAction, PostOps, PostRecord, PostRef, RepoOp,
};
pub use links::{extract_links, link_domain};
