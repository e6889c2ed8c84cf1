//! Link extraction from post records.
//!
//! Pure functions only: no network access, no side effects. Malformed
//! entries are skipped silently, matching how the pipeline treats
//! structurally-bad input everywhere else.

use crate::event::{PostRecord, EXTERNAL_EMBED_TYPE, LINK_FEATURE_TYPE};

/// Extract every referenced URL from a post, in order.
///
/// Sources, in order:
/// 1. inline rich-text facet features typed as hyperlinks;
/// 2. the external link-preview embed, if present.
///
/// Returns an empty vec when the post carries no qualifying annotation or
/// embed.
pub fn extract_links(record: &PostRecord) -> Vec<String> {
    let mut links = Vec::new();

    for facet in &record.facets {
        for feature in &facet.features {
            if feature.feature_type == LINK_FEATURE_TYPE {
                if let Some(uri) = &feature.uri {
                    if !uri.is_empty() {
                        links.push(uri.clone());
                    }
                }
            }
        }
    }

    if let Some(embed) = &record.embed {
        if embed.embed_type == EXTERNAL_EMBED_TYPE {
            if let Some(external) = &embed.external {
                if !external.uri.is_empty() {
                    links.push(external.uri.clone());
                }
            }
        }
    }

    links
}

/// Derive the lowercased hostname of a link.
///
/// Returns `None` when the link does not parse as a URL or has no host;
/// callers treat that as "skip this link", never as a hard failure.
pub fn link_domain(link: &str) -> Option<String> {
    let parsed = url::Url::parse(link).ok()?;
    parsed.host_str().map(|host| host.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Embed, ExternalEmbed, Facet, FacetFeature};

    fn link_feature(uri: &str) -> FacetFeature {
        FacetFeature {
            feature_type: LINK_FEATURE_TYPE.to_string(),
            uri: Some(uri.to_string()),
        }
    }

    #[test]
    fn test_empty_post_has_no_links() {
        let record = PostRecord::default();
        assert!(extract_links(&record).is_empty());
    }

    #[test]
    fn test_facet_links_in_order() {
        let record = PostRecord {
            facets: vec![
                Facet {
                    features: vec![link_feature("https://a.example/1")],
                },
                Facet {
                    features: vec![link_feature("https://b.example/2")],
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            extract_links(&record),
            vec!["https://a.example/1", "https://b.example/2"]
        );
    }

    #[test]
    fn test_embed_link_comes_after_facets() {
        let record = PostRecord {
            facets: vec![Facet {
                features: vec![link_feature("https://a.example/1")],
            }],
            embed: Some(Embed {
                embed_type: EXTERNAL_EMBED_TYPE.to_string(),
                external: Some(ExternalEmbed {
                    uri: "https://card.example/x".to_string(),
                }),
            }),
            ..Default::default()
        };
        assert_eq!(
            extract_links(&record),
            vec!["https://a.example/1", "https://card.example/x"]
        );
    }

    #[test]
    fn test_non_link_features_skipped() {
        let record = PostRecord {
            facets: vec![Facet {
                features: vec![
                    FacetFeature {
                        feature_type: "app.bsky.richtext.facet#mention".to_string(),
                        uri: None,
                    },
                    // link feature without a uri is malformed; skip silently
                    FacetFeature {
                        feature_type: LINK_FEATURE_TYPE.to_string(),
                        uri: None,
                    },
                ],
            }],
            ..Default::default()
        };
        assert!(extract_links(&record).is_empty());
    }

    #[test]
    fn test_non_external_embed_ignored() {
        let record = PostRecord {
            embed: Some(Embed {
                embed_type: "app.bsky.embed.images".to_string(),
                external: None,
            }),
            ..Default::default()
        };
        assert!(extract_links(&record).is_empty());
    }

    #[test]
    fn test_link_domain_lowercases_host() {
        assert_eq!(
            link_domain("https://Dominik.Social/post/1"),
            Some("dominik.social".to_string())
        );
    }

    #[test]
    fn test_link_domain_rejects_garbage() {
        assert_eq!(link_domain("not a url"), None);
        assert_eq!(link_domain("mailto:someone"), None);
    }
}
