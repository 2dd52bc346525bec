//! Batched affiliate link generation with a link cache.

use crate::api::AffiliateApi;
use crate::cache::TtlCache;
use crate::links::share_wrapped;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct AffiliateLinks {
    api: Option<Arc<dyn AffiliateApi>>,
    cache: TtlCache<String, String>,
}

impl AffiliateLinks {
    pub fn new(api: Option<Arc<dyn AffiliateApi>>, ttl: Duration) -> Self {
        Self {
            api,
            cache: TtlCache::new(ttl),
        }
    }

    /// Maps every requested target URL to its affiliate link, or `None` when
    /// no link could be produced. Uncached targets go out in one API call.
    pub async fn generate(&self, targets: &[String]) -> HashMap<String, Option<String>> {
        let mut results: HashMap<String, Option<String>> = HashMap::with_capacity(targets.len());
        let mut uncached: Vec<String> = Vec::new();

        for target in targets {
            match self.cache.get(target).await {
                Some(link) => {
                    debug!("Cache hit for affiliate link: {}", target);
                    results.insert(target.clone(), Some(link));
                }
                None => {
                    if !results.contains_key(target) {
                        uncached.push(target.clone());
                    }
                    results.insert(target.clone(), None);
                }
            }
        }

        if uncached.is_empty() {
            info!("All affiliate links retrieved from cache.");
            return results;
        }

        let api = match self.api.as_ref() {
            Some(api) => api,
            None => {
                warn!("No affiliate API configured; {} links left empty", uncached.len());
                return results;
            }
        };

        info!(
            "Generating affiliate links for {} uncached URLs: {}...",
            uncached.len(),
            uncached.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        );
        // responses echo the wrapped form, mapped back to the requested target
        let sources: HashMap<String, String> = uncached
            .iter()
            .map(|target| (share_wrapped(target), target.clone()))
            .collect();
        let source_values: Vec<String> = uncached.iter().map(|u| share_wrapped(u)).collect();

        let links = match api.generate_links(&source_values).await {
            Ok(links) => links,
            Err(e) => {
                error!("Batch link generation failed for {} URLs: {}", uncached.len(), e);
                return results;
            }
        };

        info!("Processing {} links from batch API response.", links.len());
        for link in links {
            match sources.get(&link.source_value) {
                Some(target) => {
                    self.cache
                        .set(target.clone(), link.promotion_link.clone())
                        .await;
                    results.insert(target.clone(), Some(link.promotion_link));
                }
                None => warn!(
                    "Received link for unexpected source_value in batch response: {}",
                    link.source_value
                ),
            }
        }

        for url in &uncached {
            if results.get(url).map_or(true, Option::is_none) {
                warn!("No affiliate link returned for requested URL: {}", url);
            }
        }
        results
    }

    pub async fn clear_expired(&self) -> usize {
        self.cache.clear_expired().await
    }

    pub async fn cached(&self) -> usize {
        self.cache.len().await
    }
}
