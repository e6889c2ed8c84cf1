//! Porchlight Serve - feed-skeleton HTTP API over the Porchlight index.
//!
//! This crate serves the two feeds the ingester maintains as XRPC feed
//! skeletons, plus the DID document the app view uses to verify the
//! service. It reads the SQLite index the ingester writes; it never
//! mutates it.
//!
//! # Architecture
//!
//! - **AppState**: Shared application state (read-only index connection,
//!   configuration)
//! - **Routes**: Endpoint handlers (health, DID document, feed XRPC)

mod error;
mod routes;
mod state;

pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
