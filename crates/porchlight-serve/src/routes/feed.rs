//! Feed generator XRPC endpoints.
//!
//! Serves the two feeds maintained by the ingester as feed skeletons:
//! ordered pages of post URIs the app view hydrates into full posts.
//! Pagination is keyset-based over `(indexed_at, uri)` descending, with
//! an opaque `indexed_at|uri` cursor.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Record key of the keyword-filtered feed.
pub const FILTERED_FEED_RKEY: &str = "indieweb";

/// Record key of the personal-site feed.
pub const SITE_FEED_RKEY: &str = "sites";

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 100;

// ═══════════════════════════════════════════════════════════════════════════
// Response Types
// ═══════════════════════════════════════════════════════════════════════════

/// Service DID document for `did:web` resolution.
#[derive(Debug, Clone, Serialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub service: Vec<DidService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DidService {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// Response for `describeFeedGenerator`.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeResponse {
    pub did: String,
    pub feeds: Vec<FeedDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedDescriptor {
    pub uri: String,
}

/// A feed skeleton page.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSkeleton {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub feed: Vec<SkeletonPost>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkeletonPost {
    pub post: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Query Parameters
// ═══════════════════════════════════════════════════════════════════════════

/// Query parameters for `getFeedSkeleton`.
#[derive(Debug, Clone, Deserialize)]
pub struct SkeletonQuery {
    /// Feed generator record URI.
    pub feed: String,
    /// Page size. Default: 50, max: 100.
    pub limit: Option<u32>,
    /// Opaque pagination cursor from a previous page.
    pub cursor: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Endpoints
// ═══════════════════════════════════════════════════════════════════════════

/// `GET /.well-known/did.json`
pub async fn did_document(State(state): State<AppState>) -> Json<DidDocument> {
    Json(DidDocument {
        context: vec!["https://www.w3.org/ns/did/v1".to_string()],
        id: state.config.service_did.clone(),
        service: vec![DidService {
            id: "#bsky_fg".to_string(),
            service_type: "BskyFeedGenerator".to_string(),
            service_endpoint: format!("https://{}", state.config.hostname),
        }],
    })
}

/// `GET /xrpc/app.bsky.feed.describeFeedGenerator`
pub async fn describe_feed_generator(State(state): State<AppState>) -> Json<DescribeResponse> {
    let feeds = [FILTERED_FEED_RKEY, SITE_FEED_RKEY]
        .iter()
        .map(|rkey| FeedDescriptor {
            uri: feed_uri(&state.config.publisher_did, rkey),
        })
        .collect();

    Json(DescribeResponse {
        did: state.config.service_did.clone(),
        feeds,
    })
}

/// `GET /xrpc/app.bsky.feed.getFeedSkeleton`
///
/// Returns one page of post URIs for the requested feed, newest first.
/// The trailing cursor is omitted when the page is not full, signaling
/// the end of the feed.
pub async fn get_feed_skeleton(
    State(state): State<AppState>,
    Query(query): Query<SkeletonQuery>,
) -> Result<Json<FeedSkeleton>, ApiError> {
    let table = match feed_rkey(&query.feed) {
        Some(FILTERED_FEED_RKEY) => "filtered_post",
        Some(SITE_FEED_RKEY) => "site_post",
        _ => {
            return Err(ApiError::BadRequest(format!(
                "unsupported feed: {}",
                query.feed
            )))
        }
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let cursor = query.cursor.as_deref().map(parse_cursor).transpose()?;

    let rows = fetch_page(&state, table, limit, cursor)?;

    let cursor = if rows.len() == limit as usize {
        rows.last()
            .map(|(uri, indexed_at)| format!("{}|{}", indexed_at, uri))
    } else {
        None
    };

    let feed = rows
        .into_iter()
        .map(|(uri, _)| SkeletonPost { post: uri })
        .collect();

    Ok(Json(FeedSkeleton { cursor, feed }))
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn feed_uri(publisher_did: &str, rkey: &str) -> String {
    format!("at://{}/app.bsky.feed.generator/{}", publisher_did, rkey)
}

/// Record key of a feed generator URI, if well-formed.
fn feed_rkey(feed: &str) -> Option<&str> {
    let rest = feed.strip_prefix("at://")?;
    let (_did, path) = rest.split_once('/')?;
    let (collection, rkey) = path.split_once('/')?;
    (collection == "app.bsky.feed.generator" && !rkey.is_empty()).then_some(rkey)
}

/// Parse an `indexed_at|uri` cursor.
fn parse_cursor(cursor: &str) -> Result<(String, String), ApiError> {
    cursor
        .split_once('|')
        .filter(|(indexed_at, uri)| !indexed_at.is_empty() && !uri.is_empty())
        .map(|(indexed_at, uri)| (indexed_at.to_string(), uri.to_string()))
        .ok_or_else(|| ApiError::BadRequest(format!("malformed cursor: {}", cursor)))
}

/// Fetch one keyset page of `(uri, indexed_at)` from a post table.
///
/// `table` is one of the two fixed table names, never user input.
fn fetch_page(
    state: &AppState,
    table: &str,
    limit: u32,
    cursor: Option<(String, String)>,
) -> Result<Vec<(String, String)>, ApiError> {
    let conn = state.db.lock();

    let mut rows = Vec::new();
    match cursor {
        Some((indexed_at, uri)) => {
            let sql = format!(
                "SELECT uri, indexed_at FROM {}
                 WHERE indexed_at < ?1 OR (indexed_at = ?1 AND uri < ?2)
                 ORDER BY indexed_at DESC, uri DESC
                 LIMIT ?3",
                table
            );
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(rusqlite::params![indexed_at, uri, limit], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }
        None => {
            let sql = format!(
                "SELECT uri, indexed_at FROM {}
                 ORDER BY indexed_at DESC, uri DESC
                 LIMIT ?1",
                table
            );
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(rusqlite::params![limit], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }
    }

    Ok(rows)
}
