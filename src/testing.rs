//! Test doubles for the API and page transport seams.

use crate::api::{AffiliateApi, ApiProduct, PromotionLink};
use crate::error::{Error, Result};
use crate::fetch::{Page, PageFetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Affiliate API double: canned products and links, counts calls.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub products: HashMap<String, ApiProduct>,
    pub fail_products: bool,
    pub fail_links: bool,
    pub extra_links: Vec<PromotionLink>,
    pub detail_calls: AtomicUsize,
    pub link_calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl AffiliateApi for FakeApi {
    async fn product_detail(&self, product_id: &str) -> Result<Option<ApiProduct>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_products {
            return Err(Error::Api {
                code: "500".to_string(),
                message: "boom".to_string(),
            });
        }
        Ok(self.products.get(product_id).cloned())
    }

    async fn generate_links(&self, source_values: &[String]) -> Result<Vec<PromotionLink>> {
        self.link_calls.lock().unwrap().push(source_values.to_vec());
        if self.fail_links {
            return Err(Error::UnexpectedResponse("no result".to_string()));
        }
        let mut links: Vec<PromotionLink> = source_values
            .iter()
            .enumerate()
            .map(|(i, source)| PromotionLink {
                source_value: source.clone(),
                promotion_link: format!("https://s.click.aliexpress.com/e/_gen{}", i),
            })
            .collect();
        links.extend(self.extra_links.iter().cloned());
        Ok(links)
    }
}

/// Page fetcher double serving canned pages by URL.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    pub pages: HashMap<String, Page>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn with_page(mut self, url: &str, final_url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Page {
                url: final_url.to_string(),
                status,
                body: body.to_string(),
            },
        );
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}
