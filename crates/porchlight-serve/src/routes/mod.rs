//! API route definitions.

mod feed;
mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// All endpoints are public; feed generators are consumed by the app
/// view on behalf of end users.
///
/// - `GET /health` - Health check
/// - `GET /.well-known/did.json` - Service DID document
/// - `GET /xrpc/app.bsky.feed.describeFeedGenerator` - Advertised feeds
/// - `GET /xrpc/app.bsky.feed.getFeedSkeleton` - Feed page (post URIs)
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/.well-known/did.json", get(feed::did_document))
        .route(
            "/xrpc/app.bsky.feed.describeFeedGenerator",
            get(feed::describe_feed_generator),
        )
        .route(
            "/xrpc/app.bsky.feed.getFeedSkeleton",
            get(feed::get_feed_skeleton),
        )
        .with_state(state)
}
