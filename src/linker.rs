//! The message pipeline: links in, replies out.

use crate::affiliate::AffiliateLinks;
use crate::api::{AffiliateApi, IopClient};
use crate::catalog::ProductCatalog;
use crate::config::Settings;
use crate::error::Result;
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::links::{
    classify, clean_product_url, extract_candidate_urls, extract_product_id, mentions_aliexpress,
    normalize_scheme, offer_target_url, LinkKind,
};
use crate::message::{
    processing_notice, product_reply, unexpected_error, Reply, ReplyStyle, LINK_PROMPT, NO_LINKS,
    NO_VALID_LINKS, WELCOME,
};
use crate::offers::Offer;
use crate::resolver::ShortLinkResolver;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Entry counts per cache, either removed by a sweep or currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheSweep {
    pub products: usize,
    pub links: usize,
    pub resolved: usize,
}

pub struct Linker {
    catalog: ProductCatalog,
    links: AffiliateLinks,
    resolver: ShortLinkResolver,
    style: ReplyStyle,
}

impl Linker {
    pub fn new(
        catalog: ProductCatalog,
        links: AffiliateLinks,
        resolver: ShortLinkResolver,
        style: ReplyStyle,
    ) -> Self {
        Self {
            catalog,
            links,
            resolver,
            style,
        }
    }

    /// Wires the production clients. Missing API credentials are not fatal:
    /// products then come from scraping and offers are reported as failed.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let ttl = settings.cache_ttl();
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(
            settings.http_timeout(),
            settings.proxy_url.as_deref(),
        )?);
        let api: Option<Arc<dyn AffiliateApi>> = match settings.credentials() {
            Ok(credentials) => {
                Some(Arc::new(IopClient::new(settings, credentials)?) as Arc<dyn AffiliateApi>)
            }
            Err(e) => {
                warn!("Affiliate API disabled: {}", e);
                None
            }
        };
        let style = ReplyStyle {
            footer: settings.footer.clone(),
            buttons: settings.button_rows()?,
        };

        Ok(Self::new(
            ProductCatalog::new(api.clone(), fetcher.clone(), ttl),
            AffiliateLinks::new(api, ttl),
            ShortLinkResolver::new(fetcher, ttl, &settings.country),
            style,
        ))
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Replies to one chat message, in the order they should be sent.
    pub async fn handle_message(self: &Arc<Self>, text: &str) -> Vec<Reply> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if is_start_command(text) {
            return vec![Reply::text(WELCOME)];
        }
        if text.starts_with('/') {
            debug!("Ignoring unsupported command: {}", text);
            return Vec::new();
        }
        if !mentions_aliexpress(text) {
            return vec![Reply::text(LINK_PROMPT)];
        }

        let candidates = extract_candidate_urls(text);
        if candidates.is_empty() {
            return vec![Reply::text(NO_LINKS)];
        }
        info!("Found {} potential URLs in message", candidates.len());

        let products = self.collect_products(&candidates).await;
        if products.is_empty() {
            info!("No processable AliExpress product links found after filtering/resolution");
            return vec![Reply::text(NO_VALID_LINKS)];
        }

        let mut replies = Vec::with_capacity(products.len() + 1);
        if products.len() > 1 {
            replies.push(processing_notice(products.len()));
        }
        info!("Processing {} unique AliExpress products", products.len());

        let (ids, tasks): (Vec<String>, Vec<JoinHandle<Reply>>) = products
            .into_iter()
            .map(|(id, base_url)| {
                let linker = Arc::clone(self);
                let task_id = id.clone();
                let task =
                    tokio::spawn(async move { linker.process_product(&task_id, &base_url).await });
                (id, task)
            })
            .unzip();

        for (id, outcome) in ids.into_iter().zip(join_all(tasks).await) {
            match outcome {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    error!("Unhandled error processing product {}: {}", id, e);
                    replies.push(unexpected_error(&id));
                }
            }
        }
        replies
    }

    /// `(product id, clean base url)` pairs, first occurrence of each id only.
    async fn collect_products(&self, candidates: &[String]) -> Vec<(String, String)> {
        let mut products: Vec<(String, String)> = Vec::new();
        for candidate in candidates {
            let url = match normalize_scheme(candidate) {
                Some(url) => url,
                None => continue,
            };
            let product_url = match classify(&url) {
                LinkKind::Product => url,
                LinkKind::Short => match self.resolver.resolve(&url).await {
                    Some(resolved) => resolved,
                    None => {
                        warn!("Could not resolve or extract ID from short link: {}", candidate);
                        continue;
                    }
                },
                LinkKind::Other => {
                    debug!("Ignoring non-product URL: {}", url);
                    continue;
                }
            };

            let id = match extract_product_id(&product_url) {
                Some(id) => id,
                None => continue,
            };
            if products.iter().any(|(seen, _)| *seen == id) {
                debug!("Skipping duplicate product ID: {}", id);
                continue;
            }
            if let Some(base_url) = clean_product_url(&product_url, &id) {
                debug!("Found product URL: {} -> ID: {}, Base: {}", product_url, id, base_url);
                products.push((id, base_url));
            }
        }
        products
    }

    /// Looks up the product and generates its offer links concurrently.
    pub async fn process_product(&self, product_id: &str, base_url: &str) -> Reply {
        info!("Processing Product ID: {}", product_id);
        let targets: Vec<(Offer, String)> = Offer::ALL
            .iter()
            .map(|offer| (*offer, offer_target_url(base_url, &offer.params())))
            .collect();
        let urls: Vec<String> = targets.iter().map(|(_, url)| url.clone()).collect();

        let (details, mut generated) =
            tokio::join!(self.catalog.lookup(product_id), self.links.generate(&urls));

        let offer_links: Vec<(Offer, Option<String>)> = targets
            .into_iter()
            .map(|(offer, url)| {
                let link = generated.remove(&url).flatten();
                if link.is_none() {
                    warn!(
                        "Failed to get affiliate link for offer {} for product {}",
                        offer.key(),
                        product_id
                    );
                }
                (offer, link)
            })
            .collect();

        product_reply(&details, &offer_links, &self.style)
    }

    pub async fn clear_expired(&self) -> CacheSweep {
        CacheSweep {
            products: self.catalog.clear_expired().await,
            links: self.links.clear_expired().await,
            resolved: self.resolver.clear_expired().await,
        }
    }

    pub async fn cache_sizes(&self) -> CacheSweep {
        CacheSweep {
            products: self.catalog.cached().await,
            links: self.links.cached().await,
            resolved: self.resolver.cached().await,
        }
    }

    /// Sweeps expired cache entries once after `first`, then every `every`.
    pub fn spawn_janitor(self: Arc<Self>, first: Duration, every: Duration) -> JoinHandle<()> {
        let every = every.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + first, every);
            loop {
                ticker.tick().await;
                info!("Running periodic cache cleanup...");
                let swept = self.clear_expired().await;
                let sizes = self.cache_sizes().await;
                info!(
                    "Cache cleanup: removed {} product, {} link, {} resolved URL entries",
                    swept.products, swept.links, swept.resolved
                );
                info!(
                    "Cache stats: {} products, {} links, {} resolved URLs in cache.",
                    sizes.products, sizes.links, sizes.resolved
                );
            }
        })
    }
}

/// `/start`, optionally addressed as `/start@botname` or with a payload.
fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|cmd| cmd.split('@').next())
        .map_or(false, |cmd| cmd.eq_ignore_ascii_case("/start"))
}
