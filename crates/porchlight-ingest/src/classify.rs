//! Personal-site post classification.
//!
//! A post is admitted when at least one of its links points at the
//! author's own domain. Two tiers, evaluated in order per link:
//!
//! 1. the link's domain equals the resolved handle, provided the handle is
//!    not on the shared hosting suffix (a free `.bsky.social` account must
//!    not self-match just because someone linked to its profile subdomain);
//! 2. the link's domain appears in the registry's mapping for the handle —
//!    an explicit opt-in, so the suffix restriction does not apply.
//!
//! One matching link admits the whole post; evaluation short-circuits.

use crate::registry::DomainRegistry;
use porchlight_core::links::link_domain;
use porchlight_core::SHARED_HOST_SUFFIX;
use std::sync::Arc;

/// Post classifier over the mapping registry.
#[derive(Clone)]
pub struct Classifier {
    registry: Arc<DomainRegistry>,
}

impl Classifier {
    pub fn new(registry: Arc<DomainRegistry>) -> Self {
        Self { registry }
    }

    /// Decide whether a post with the given resolved handle and extracted
    /// links belongs in the site feed.
    ///
    /// An empty link list rejects immediately without touching the
    /// registry. Links that fail to parse are skipped, not fatal.
    pub fn classify(&self, handle: &str, links: &[String]) -> bool {
        if links.is_empty() {
            return false;
        }

        let handle = handle.to_ascii_lowercase();
        let self_match_allowed = !handle.ends_with(SHARED_HOST_SUFFIX);
        let mapped = self.registry.lookup(&handle);

        for link in links {
            let Some(domain) = link_domain(link) else {
                continue;
            };

            if self_match_allowed && domain == handle {
                return true;
            }

            if mapped.contains(&domain) {
                return true;
            }
        }

        false
    }
}
