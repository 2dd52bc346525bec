//! Follows `s.click` / `a.aliexpress` short links to the product page.

use crate::cache::TtlCache;
use crate::fetch::PageFetcher;
use crate::links::{classify, extract_product_id, to_com_domain, with_ship_to, LinkKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct ShortLinkResolver {
    fetcher: Arc<dyn PageFetcher>,
    cache: TtlCache<String, String>,
    country: String,
}

impl ShortLinkResolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, ttl: Duration, country: &str) -> Self {
        Self {
            fetcher,
            cache: TtlCache::new(ttl),
            country: country.to_string(),
        }
    }

    /// Final product URL for a short link, or `None` when it does not lead
    /// to a recognizable product page.
    pub async fn resolve(&self, short_url: &str) -> Option<String> {
        let key = short_url.to_string();
        if let Some(final_url) = self.cache.get(&key).await {
            info!("Cache hit for resolved short link: {} -> {}", short_url, final_url);
            return Some(final_url);
        }

        info!("Resolving short link: {}", short_url);
        let page = match self.fetcher.fetch(short_url).await {
            Ok(page) => page,
            Err(e) => {
                error!("Error resolving short link {}: {}", short_url, e);
                return None;
            }
        };
        if !page.is_ok() {
            error!("Failed to resolve short link {}. Status: {}", short_url, page.status);
            return None;
        }
        info!("Resolved {} to {}", short_url, page.url);

        let mut final_url = to_com_domain(&page.url);
        if final_url.contains("_randl_shipto=") {
            final_url = with_ship_to(&final_url, &self.country);
            info!("Re-fetching URL with ship-to country {}: {}", self.country, final_url);
            match self.fetcher.fetch(&final_url).await {
                Ok(page) if page.is_ok() => final_url = to_com_domain(&page.url),
                Ok(page) => warn!("Re-fetch of {} returned status {}", final_url, page.status),
                Err(e) => warn!("Error re-fetching URL with updated country parameter: {}", e),
            }
        }

        if classify(&final_url) == LinkKind::Product && extract_product_id(&final_url).is_some() {
            self.cache.set(key, final_url.clone()).await;
            Some(final_url)
        } else {
            warn!(
                "Resolved URL {} doesn't look like a valid AliExpress product page.",
                final_url
            );
            None
        }
    }

    pub async fn clear_expired(&self) -> usize {
        self.cache.clear_expired().await
    }

    pub async fn cached(&self) -> usize {
        self.cache.len().await
    }
}
