//! Porchlight stream-indexing pipeline components.
//!
//! This crate consumes firehose commit events and maintains the two feed
//! indexes: the keyword-filtered table and the classified personal-site
//! table.
//!
//! # Modules
//!
//! - [`source`] - Commit-event source adapters (JSONL replay)
//! - [`pipeline`] - The indexer: per-event classification and cursor checkpointing
//! - [`registry`] - Hot-reloadable handle→domain mapping registry
//! - [`resolver`] - DID → handle identity resolution
//! - [`classify`] - Personal-site post classification
//! - [`store`] - SQLite index store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CommitSource   │  (JSONL replay, live firehose)
//! └────────┬────────┘
//!          │ mpsc channel (single consumer preserves stream order)
//!          ▼
//! ┌─────────────────┐      ┌────────────────┐
//! │     Indexer     │◄─────│ DomainRegistry │  handle→domain mappings,
//! │  keyword branch │      └────────────────┘  reloaded on a timer
//! │  site branch    │◄─────┐
//! └────────┬────────┘      │
//!          │          ┌────┴──────────┐
//!          │          │ HandleResolver│  DID → handle (PLC directory)
//!          ▼          └───────────────┘
//! ┌─────────────────┐
//! │   IndexStore    │  SQLite - filtered_post, site_post, stream_cursor
//! └─────────────────┘
//! ```
//!
//! The store is idempotent per event: deletes run before inserts inside
//! one transaction and re-inserting an existing uri is a no-op, so
//! replaying events after a crash is always safe.

pub mod classify;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use classify::Classifier;
pub use pipeline::{Indexer, IndexerConfig, IndexerStats};
pub use registry::{DomainRegistry, DomainTable, RegistryConfig};
pub use resolver::{DidResolver, HandleResolver, PlcDirectoryResolver};
pub use source::{CommitSource, JsonlConfig, JsonlSource, SourceStats};
pub use store::{FilteredPost, IndexStore, MutationBatch, SitePost};
