//! Product data lookup: affiliate API first, page scraping second,
//! placeholder values last.

use crate::api::AffiliateApi;
use crate::cache::TtlCache;
use crate::fetch::PageFetcher;
use crate::html_extractor::{ProductPageExtractor, ScrapedProduct};
use crate::links::{coin_page_url, product_page_url};
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a product's details came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailsSource {
    Api,
    Scraped,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Price {
    pub amount: String,
    pub currency: String,
}

impl Price {
    pub fn display(&self) -> String {
        format!("{} {}", self.amount, self.currency).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetails {
    pub id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub price: Option<Price>,
    pub source: DetailsSource,
}

impl ProductDetails {
    pub fn placeholder(product_id: &str) -> Self {
        Self {
            id: product_id.to_string(),
            title: format!("Product {}", product_id),
            image_url: None,
            price: None,
            source: DetailsSource::Placeholder,
        }
    }

    fn from_scrape(product_id: &str, scraped: ScrapedProduct) -> Self {
        Self {
            id: product_id.to_string(),
            title: scraped
                .title
                .unwrap_or_else(|| format!("Product {}", product_id)),
            image_url: scraped.image_url,
            // scraped prices already carry their currency marker
            price: scraped.price.map(|amount| Price {
                amount,
                currency: String::new(),
            }),
            source: DetailsSource::Scraped,
        }
    }
}

pub struct ProductCatalog {
    api: Option<Arc<dyn AffiliateApi>>,
    fetcher: Arc<dyn PageFetcher>,
    cache: TtlCache<String, ProductDetails>,
}

impl ProductCatalog {
    pub fn new(
        api: Option<Arc<dyn AffiliateApi>>,
        fetcher: Arc<dyn PageFetcher>,
        ttl: Duration,
    ) -> Self {
        Self {
            api,
            fetcher,
            cache: TtlCache::new(ttl),
        }
    }

    /// Never fails: every error along the chain degrades to the next step.
    pub async fn lookup(&self, product_id: &str) -> ProductDetails {
        let key = product_id.to_string();
        if let Some(cached) = self.cache.get(&key).await {
            info!("Cache hit for product ID: {}", product_id);
            return cached;
        }

        if let Some(details) = self.from_api(product_id).await {
            self.remember(key, &details).await;
            return details;
        }

        warn!("API failed for product ID: {}. Attempting scraping fallback.", product_id);
        if let Some(details) = self.from_page(product_id).await {
            self.remember(key, &details).await;
            return details;
        }

        warn!("Scraping also failed for product ID: {}", product_id);
        ProductDetails::placeholder(product_id)
    }

    async fn remember(&self, key: String, details: &ProductDetails) {
        self.cache.set(key, details.clone()).await;
        debug!(
            "Cached product {} until {}",
            details.id,
            expiry_label(self.cache.ttl())
        );
    }

    async fn from_api(&self, product_id: &str) -> Option<ProductDetails> {
        let api = self.api.as_ref()?;
        info!("Fetching product details for ID: {}", product_id);
        match api.product_detail(product_id).await {
            Ok(Some(product)) => Some(ProductDetails {
                id: product_id.to_string(),
                title: product.title,
                image_url: product.image_url,
                price: product.price.map(|amount| Price {
                    amount,
                    currency: product.currency,
                }),
                source: DetailsSource::Api,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("Product detail API call failed for ID {}: {}", product_id, e);
                None
            }
        }
    }

    async fn from_page(&self, product_id: &str) -> Option<ProductDetails> {
        for url in [product_page_url(product_id), coin_page_url(product_id)] {
            let page = match self.fetcher.fetch(&url).await {
                Ok(page) if page.is_ok() => page,
                Ok(page) => {
                    warn!("Failed to load page {}: status {}", url, page.status);
                    continue;
                }
                Err(e) => {
                    warn!("Error fetching {}: {}", url, e);
                    continue;
                }
            };
            let scraped = ProductPageExtractor::extract(&page.body);
            if scraped.is_usable() {
                info!("Successfully scraped details for product ID: {}", product_id);
                return Some(ProductDetails::from_scrape(product_id, scraped));
            }
            debug!("No product title found on {}", url);
        }
        None
    }

    pub async fn clear_expired(&self) -> usize {
        self.cache.clear_expired().await
    }

    pub async fn cached(&self) -> usize {
        self.cache.len().await
    }
}

/// Wall-clock expiry for a TTL starting now, or "never" past chrono's range.
fn expiry_label(ttl: Duration) -> String {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Local::now().checked_add_signed(ttl))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiProduct;
    use crate::testing::{FakeApi, FakeFetcher};
    use std::sync::atomic::Ordering;

    fn api_product(title: &str) -> ApiProduct {
        ApiProduct {
            title: title.to_string(),
            image_url: Some("https://ae01.alicdn.com/kf/x.jpg".to_string()),
            price: Some("4.20".to_string()),
            currency: "USD".to_string(),
        }
    }

    fn catalog(api: Option<Arc<FakeApi>>, fetcher: Arc<FakeFetcher>) -> ProductCatalog {
        ProductCatalog::new(
            api.map(|a| a as Arc<dyn AffiliateApi>),
            fetcher,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_api_result_is_cached() {
        let mut fake = FakeApi::default();
        fake.products.insert("1".to_string(), api_product("Lamp"));
        let api = Arc::new(fake);
        let fetcher = Arc::new(FakeFetcher::default());
        let catalog = catalog(Some(api.clone()), fetcher.clone());

        let first = catalog.lookup("1").await;
        let second = catalog.lookup("1").await;

        assert_eq!(first, second);
        assert_eq!(first.source, DetailsSource::Api);
        assert_eq!(first.price.as_ref().map(Price::display).as_deref(), Some("4.20 USD"));
        assert_eq!(api.detail_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn test_huge_ttl_lookup_still_caches() {
        let mut fake = FakeApi::default();
        fake.products.insert("8".to_string(), api_product("Kettle"));
        let catalog = ProductCatalog::new(
            Some(Arc::new(fake) as Arc<dyn AffiliateApi>),
            Arc::new(FakeFetcher::default()),
            Duration::from_secs(1_000_000_000_000_000),
        );

        let details = catalog.lookup("8").await;
        assert_eq!(details.title, "Kettle");
        assert_eq!(catalog.cached().await, 1);
        assert_eq!(catalog.lookup("8").await, details);
    }

    #[test]
    fn test_expiry_label() {
        assert_eq!(expiry_label(Duration::from_secs(1_000_000_000_000_000)), "never");
        assert_eq!(expiry_label(Duration::MAX), "never");
        assert_ne!(expiry_label(Duration::from_secs(86_400)), "never");
    }

    #[tokio::test]
    async fn test_api_failure_falls_back_to_scraping() {
        let api = Arc::new(FakeApi {
            fail_products: true,
            ..Default::default()
        });
        let fetcher = Arc::new(FakeFetcher::default().with_page(
            &product_page_url("2"),
            &product_page_url("2"),
            200,
            r#"<meta property="og:title" content="Scraped Lamp - AliExpress">"#,
        ));
        let catalog = catalog(Some(api), fetcher);

        let details = catalog.lookup("2").await;
        assert_eq!(details.source, DetailsSource::Scraped);
        assert_eq!(details.title, "Scraped Lamp");
        assert_eq!(catalog.cached().await, 1);
    }

    #[tokio::test]
    async fn test_coin_page_tried_after_item_page() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_page(&product_page_url("3"), &product_page_url("3"), 200, "<p>captcha</p>")
                .with_page(&coin_page_url("3"), &coin_page_url("3"), 200, "<h1>Coin Lamp</h1>"),
        );
        let catalog = catalog(None, fetcher.clone());

        let details = catalog.lookup("3").await;
        assert_eq!(details.title, "Coin Lamp");
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_everything_failing_gives_uncached_placeholder() {
        let api = Arc::new(FakeApi::default());
        let fetcher = Arc::new(FakeFetcher::default().with_page(
            &product_page_url("4"),
            &product_page_url("4"),
            503,
            "",
        ));
        let catalog = catalog(Some(api), fetcher);

        let details = catalog.lookup("4").await;
        assert_eq!(details, ProductDetails::placeholder("4"));
        assert_eq!(details.title, "Product 4");
        assert_eq!(catalog.cached().await, 0);
    }
}
