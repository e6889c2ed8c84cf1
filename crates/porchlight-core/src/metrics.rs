//! Prometheus metrics helpers for the Porchlight system.
//!
//! Centralized metrics initialization and the metric descriptions used
//! across components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use porchlight_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     use metrics::counter;
//!     counter!("ingest_events_total").increment(1);
//! }
//! ```

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the given port. Spawns a background
/// task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    Ok(())
}

/// Register descriptions for the metrics used across Porchlight.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // Stream ingestion
    describe_counter!("ingest_events_total", "Commit events consumed from the stream");
    describe_counter!(
        "ingest_posts_created_total",
        "Post create operations seen across all events"
    );
    describe_counter!(
        "ingest_posts_deleted_total",
        "Post delete operations seen across all events"
    );

    // Index maintenance
    describe_counter!(
        "index_filtered_total",
        "Posts staged for the keyword-filtered table"
    );
    describe_counter!(
        "index_site_total",
        "Posts admitted by the classifier into the site table"
    );
    describe_counter!(
        "index_deleted_total",
        "Rows removed from the index by delete operations"
    );

    // Identity resolution
    describe_counter!(
        "resolver_lookups_total",
        "Identity resolution attempts"
    );
    describe_counter!(
        "resolver_failures_total",
        "Identity resolutions that returned unresolved"
    );

    // Mapping registry
    describe_counter!("registry_reloads_total", "Successful mapping-table reloads");
    describe_counter!(
        "registry_reload_failures_total",
        "Mapping-table reloads that kept the previous table"
    );
    describe_gauge!("registry_entries", "Handles in the current mapping table");

    // Cursor checkpointing
    describe_counter!(
        "cursor_checkpoints_total",
        "Durable cursor writes performed"
    );
    describe_gauge!("cursor_position", "Last stream position seen");
}

/// Increment a counter. Convenience wrapper around `metrics::counter!`.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value. Convenience wrapper around `metrics::gauge!`.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();
        // At most one install can succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_helpers_do_not_panic() {
        ensure_metrics_init();
        increment("test_counter", 0);
        increment("test_counter", 100);
        set_gauge("test_gauge", 0.0);
        set_gauge("test_gauge", -42.5);
    }

    #[test]
    fn test_register_common_metrics_idempotent() {
        ensure_metrics_init();
        register_common_metrics();
        register_common_metrics();
    }
}
