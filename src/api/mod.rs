//! Client for the AliExpress affiliate (IOP) gateway.

mod models;
mod sign;

pub use models::{parse_link_generate, parse_product_detail, ApiProduct, PromotionLink};
pub use sign::sign;

use crate::config::{Credentials, Settings};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

const PARTNER_ID: &str = "aliexpress-linker";
const PRODUCT_DETAIL_FIELDS: &str =
    "product_main_image_url,target_sale_price,product_title,target_sale_price_currency";

/// The two affiliate calls the linker needs.
#[async_trait]
pub trait AffiliateApi: Send + Sync {
    /// `Ok(None)` when the product is unknown to the affiliate catalogue.
    async fn product_detail(&self, product_id: &str) -> Result<Option<ApiProduct>>;

    /// Generates tracked links for every source URL in a single call.
    async fn generate_links(&self, source_values: &[String]) -> Result<Vec<PromotionLink>>;
}

pub struct IopClient {
    client: wreq::Client,
    api_url: String,
    credentials: Credentials,
    tracking_id: String,
    currency: String,
    language: String,
    country: String,
}

impl IopClient {
    pub fn new(settings: &Settings, credentials: Credentials) -> Result<Self> {
        let client = wreq::Client::builder()
            .timeout(settings.http_timeout())
            .build()?;
        info!(
            "AliExpress API client initialized (key {}..., tracking id {})",
            credentials.app_key.chars().take(4).collect::<String>(),
            settings.tracking_id
        );
        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            credentials,
            tracking_id: settings.tracking_id.clone(),
            currency: settings.currency.clone(),
            language: settings.language.clone(),
            country: settings.country.clone(),
        })
    }

    /// Signed system parameters plus `api_params`, ready to send.
    fn signed_params(
        &self,
        method: &str,
        api_params: &[(&str, String)],
        timestamp_ms: i64,
    ) -> BTreeMap<String, String> {
        let mut params: BTreeMap<String, String> = api_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        params.insert("app_key".to_string(), self.credentials.app_key.clone());
        params.insert("format".to_string(), "json".to_string());
        params.insert("method".to_string(), method.to_string());
        params.insert("partner_id".to_string(), PARTNER_ID.to_string());
        params.insert("sign_method".to_string(), "sha256".to_string());
        params.insert("timestamp".to_string(), timestamp_ms.to_string());
        let signature = sign(&self.credentials.app_secret, &params);
        params.insert("sign".to_string(), signature);
        params
    }

    /// Calls one gateway method and returns the raw JSON body.
    pub async fn execute(
        &self,
        method: &str,
        api_params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let params = self.signed_params(method, api_params, chrono::Utc::now().timestamp_millis());
        let mut url = Url::parse(&self.api_url)?;
        for (k, v) in &params {
            url.query_pairs_mut().append_pair(k, v);
        }

        debug!("Calling {}", method);
        let resp = self.client.get(url.as_str()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: self.api_url.clone(),
            });
        }
        Ok(resp.json::<serde_json::Value>().await?)
    }
}

#[async_trait]
impl AffiliateApi for IopClient {
    async fn product_detail(&self, product_id: &str) -> Result<Option<ApiProduct>> {
        let body = self
            .execute(
                "aliexpress.affiliate.productdetail.get",
                &[
                    ("fields", PRODUCT_DETAIL_FIELDS.to_string()),
                    ("product_ids", product_id.to_string()),
                    ("target_currency", self.currency.clone()),
                    ("target_language", self.language.clone()),
                    ("tracking_id", self.tracking_id.clone()),
                    ("country", self.country.clone()),
                ],
            )
            .await?;
        parse_product_detail(&body, product_id, &self.currency)
    }

    async fn generate_links(&self, source_values: &[String]) -> Result<Vec<PromotionLink>> {
        let body = self
            .execute(
                "aliexpress.affiliate.link.generate",
                &[
                    ("promotion_link_type", "0".to_string()),
                    ("source_values", source_values.join(",")),
                    ("tracking_id", self.tracking_id.clone()),
                ],
            )
            .await?;
        parse_link_generate(&body)
    }
}
