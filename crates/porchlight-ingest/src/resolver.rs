//! Identity resolution: author DID → human-readable handle.
//!
//! The external lookup is abstracted behind [`DidResolver`] so the
//! pipeline can be tested without a network. [`HandleResolver`] is the
//! failure-tolerant adapter the pipeline actually uses: every failure mode
//! (transport error, malformed document, empty alias list) collapses to
//! "unresolved" with a warning. Resolution failures never reach the caller
//! as errors.

use crate::error::Result;
use async_trait::async_trait;
use porchlight_core::AT_URI_PREFIX;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// The subset of a DID document the indexer consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DidDocument {
    #[serde(default)]
    pub id: String,

    /// Ordered identity aliases; the first is the canonical handle,
    /// usually in `at://handle` form.
    #[serde(default, rename = "alsoKnownAs")]
    pub also_known_as: Vec<String>,
}

/// External identity-resolution contract.
#[async_trait]
pub trait DidResolver: Send + Sync {
    /// Resolve a DID to its document, or `None` when the DID is unknown.
    async fn resolve(&self, did: &str) -> Result<Option<DidDocument>>;
}

/// Resolver backed by the PLC directory, with `did:web` support.
pub struct PlcDirectoryResolver {
    client: reqwest::Client,
    plc_url: String,
}

/// Default PLC directory endpoint.
pub const DEFAULT_PLC_URL: &str = "https://plc.directory";

impl PlcDirectoryResolver {
    pub fn new(plc_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");

        Self {
            client,
            plc_url: plc_url.into(),
        }
    }
}

impl Default for PlcDirectoryResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PLC_URL)
    }
}

#[async_trait]
impl DidResolver for PlcDirectoryResolver {
    async fn resolve(&self, did: &str) -> Result<Option<DidDocument>> {
        let url = if let Some(host) = did.strip_prefix("did:web:") {
            format!("https://{}/.well-known/did.json", host)
        } else if did.starts_with("did:plc:") {
            format!("{}/{}", self.plc_url.trim_end_matches('/'), did)
        } else {
            // Unknown DID method
            return Ok(None);
        };

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let document = response.json::<DidDocument>().await?;
        Ok(Some(document))
    }
}

/// Failure-tolerant adapter over a [`DidResolver`].
#[derive(Clone)]
pub struct HandleResolver {
    inner: Arc<dyn DidResolver>,
}

impl HandleResolver {
    pub fn new(inner: Arc<dyn DidResolver>) -> Self {
        Self { inner }
    }

    /// Resolve a DID to a bare, lowercased handle.
    ///
    /// Takes the first alias from the document and strips the `at://`
    /// prefix when present. Returns `None` on any failure; the condition
    /// is logged, never raised.
    pub async fn resolve_handle(&self, did: &str) -> Option<String> {
        metrics::counter!("resolver_lookups_total").increment(1);

        let document = match self.inner.resolve(did).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                tracing::debug!(did, "identity document not found");
                metrics::counter!("resolver_failures_total").increment(1);
                return None;
            }
            Err(e) => {
                tracing::warn!(did, error = %e, "identity resolution failed");
                metrics::counter!("resolver_failures_total").increment(1);
                return None;
            }
        };

        let Some(alias) = document.also_known_as.first() else {
            tracing::debug!(did, "identity document has no aliases");
            metrics::counter!("resolver_failures_total").increment(1);
            return None;
        };

        let handle = alias
            .strip_prefix(AT_URI_PREFIX)
            .unwrap_or(alias)
            .to_ascii_lowercase();
        Some(handle)
    }
}
