//! Commit-event model and typed operation extraction.
//!
//! A commit event is one unit of change delivered by the firehose transport:
//! a repository revision bundling zero or more create/delete operations
//! across record collections. The indexer only cares about the post
//! collection; everything else is dropped during extraction.
//!
//! Records arrive as untyped JSON. A create whose record fails schema
//! validation is skipped with a warning rather than failing the batch:
//! the stream carries plenty of exotic records and one bad one must never
//! stall ingestion.

use crate::error::Result;
use crate::{AT_URI_PREFIX, POST_COLLECTION};
use serde::{Deserialize, Serialize};

/// One decoded commit event from the firehose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Stream sequence number (monotonically increasing cursor position).
    pub seq: i64,

    /// DID of the repository (the post author).
    pub repo: String,

    /// Commit timestamp as supplied by the transport, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    /// Record operations contained in this commit.
    #[serde(default)]
    pub ops: Vec<RepoOp>,
}

/// Operation kind within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    Create,
    Delete,
}

/// A single record operation: `path` is `collection/rkey`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOp {
    pub action: OpAction,

    pub path: String,

    /// Content identifier (version token). Present on creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    /// The record body. Present on creates, absent on deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
}

/// A post record as carried by create operations.
///
/// Only the fields the indexer consumes are modeled; unknown fields are
/// ignored by serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostRecord {
    /// Visible post text.
    #[serde(default)]
    pub text: String,

    /// Rich-text annotations (hyperlinks, mentions, tags).
    #[serde(default)]
    pub facets: Vec<Facet>,

    /// Optional embed (link preview card, images, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

/// A rich-text facet: a byte range of the text with typed features.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facet {
    #[serde(default)]
    pub features: Vec<FacetFeature>,
}

/// A single facet feature. Only link features carry a `uri`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetFeature {
    #[serde(rename = "$type", default)]
    pub feature_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Facet feature type for inline hyperlinks.
pub const LINK_FEATURE_TYPE: &str = "app.bsky.richtext.facet#link";

/// Embed type for external link-preview cards.
pub const EXTERNAL_EMBED_TYPE: &str = "app.bsky.embed.external";

/// A post embed. Only the external (link card) variant is consumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(rename = "$type", default)]
    pub embed_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalEmbed>,
}

/// The external link carried by a link-preview embed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalEmbed {
    #[serde(default)]
    pub uri: String,
}

/// A created post, ready for the index branches.
#[derive(Debug, Clone)]
pub struct PostRef {
    /// `at://` URI of the post (primary key in the index).
    pub uri: String,
    /// Content identifier (version token).
    pub cid: String,
    /// Decoded record body.
    pub record: PostRecord,
}

/// Post operations extracted from one commit event.
#[derive(Debug, Clone, Default)]
pub struct PostOps {
    /// Created posts with decoded records.
    pub creates: Vec<PostRef>,
    /// URIs of deleted posts.
    pub deletes: Vec<String>,
}

impl PostOps {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.deletes.is_empty()
    }
}

/// Split an operation path into `(collection, rkey)`.
pub fn split_op_path(path: &str) -> Result<(&str, &str)> {
    path.split_once('/')
        .filter(|(collection, rkey)| !collection.is_empty() && !rkey.is_empty())
        .ok_or_else(|| crate::Error::InvalidOpPath(path.to_string()))
}

/// Extract typed post operations from a commit event.
///
/// Operations outside the post collection are ignored. Creates missing a
/// cid or whose record fails schema validation are skipped with a warning;
/// the rest of the event is processed normally.
pub fn extract_post_ops(event: &CommitEvent) -> PostOps {
    let mut ops = PostOps::default();

    for op in &event.ops {
        let (collection, _rkey) = match split_op_path(&op.path) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(seq = event.seq, error = %e, "skipping malformed operation");
                continue;
            }
        };

        if collection != POST_COLLECTION {
            continue;
        }

        let uri = format!("{}{}/{}", AT_URI_PREFIX, event.repo, op.path);

        match op.action {
            OpAction::Delete => ops.deletes.push(uri),
            OpAction::Create => {
                let Some(cid) = op.cid.clone() else {
                    tracing::warn!(seq = event.seq, uri = %uri, "create without cid, skipping");
                    continue;
                };
                let Some(value) = op.record.clone() else {
                    tracing::warn!(seq = event.seq, uri = %uri, "create without record, skipping");
                    continue;
                };
                match serde_json::from_value::<PostRecord>(value) {
                    Ok(record) => ops.creates.push(PostRef { uri, cid, record }),
                    Err(e) => {
                        tracing::warn!(seq = event.seq, uri = %uri, error = %e, "invalid post record, skipping");
                    }
                }
            }
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_op(action: OpAction, rkey: &str, record: Option<serde_json::Value>) -> RepoOp {
        RepoOp {
            action,
            path: format!("{}/{}", POST_COLLECTION, rkey),
            cid: matches!(action, OpAction::Create).then(|| format!("cid-{}", rkey)),
            record,
        }
    }

    fn event(ops: Vec<RepoOp>) -> CommitEvent {
        CommitEvent {
            seq: 1,
            repo: "did:plc:abc123".to_string(),
            time: None,
            ops,
        }
    }

    #[test]
    fn test_split_op_path() {
        assert_eq!(
            split_op_path("app.bsky.feed.post/3kabc").unwrap(),
            ("app.bsky.feed.post", "3kabc")
        );
        assert!(split_op_path("no-slash").is_err());
        assert!(split_op_path("/rkey").is_err());
        assert!(split_op_path("collection/").is_err());
    }

    #[test]
    fn test_extract_creates_and_deletes() {
        let ev = event(vec![
            post_op(OpAction::Create, "aaa", Some(json!({"text": "hello"}))),
            post_op(OpAction::Delete, "bbb", None),
        ]);

        let ops = extract_post_ops(&ev);
        assert_eq!(ops.creates.len(), 1);
        assert_eq!(ops.deletes.len(), 1);
        assert_eq!(
            ops.creates[0].uri,
            "at://did:plc:abc123/app.bsky.feed.post/aaa"
        );
        assert_eq!(ops.creates[0].record.text, "hello");
        assert_eq!(
            ops.deletes[0],
            "at://did:plc:abc123/app.bsky.feed.post/bbb"
        );
    }

    #[test]
    fn test_other_collections_ignored() {
        let ev = event(vec![RepoOp {
            action: OpAction::Create,
            path: "app.bsky.feed.like/3kaaa".to_string(),
            cid: Some("cid-like".to_string()),
            record: Some(json!({"subject": {}})),
        }]);

        assert!(extract_post_ops(&ev).is_empty());
    }

    #[test]
    fn test_invalid_record_skipped_batch_continues() {
        let ev = event(vec![
            // text must be a string, not an object
            post_op(OpAction::Create, "bad", Some(json!({"text": {"nested": true}}))),
            post_op(OpAction::Create, "good", Some(json!({"text": "fine"}))),
        ]);

        let ops = extract_post_ops(&ev);
        assert_eq!(ops.creates.len(), 1);
        assert_eq!(ops.creates[0].record.text, "fine");
    }

    #[test]
    fn test_create_without_cid_skipped() {
        let mut op = post_op(OpAction::Create, "aaa", Some(json!({"text": "x"})));
        op.cid = None;
        let ops = extract_post_ops(&event(vec![op]));
        assert!(ops.creates.is_empty());
    }

    #[test]
    fn test_record_with_unknown_fields_decodes() {
        let record = json!({
            "$type": "app.bsky.feed.post",
            "text": "hi",
            "createdAt": "2024-05-01T00:00:00Z",
            "langs": ["en"]
        });
        let ops = extract_post_ops(&event(vec![post_op(OpAction::Create, "aaa", Some(record))]));
        assert_eq!(ops.creates.len(), 1);
    }

    #[test]
    fn test_event_json_roundtrip() {
        let json = r#"{"seq":42,"repo":"did:plc:xyz","ops":[{"action":"delete","path":"app.bsky.feed.post/3k"}]}"#;
        let ev: CommitEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.seq, 42);
        assert_eq!(ev.ops.len(), 1);
        assert_eq!(ev.ops[0].action, OpAction::Delete);
    }
}
