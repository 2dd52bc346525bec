//! Affiliate gateway responses.
//!
//! Every method wraps its payload as
//! `{"<method>_response": {"resp_result": {"resp_code": 200, "result": ...}}}`
//! or reports failure as `{"error_response": {"code": ..., "msg": ...}}`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const PRODUCT_DETAIL_ENVELOPE: &str = "aliexpress_affiliate_productdetail_get_response";
pub const LINK_GENERATE_ENVELOPE: &str = "aliexpress_affiliate_link_generate_response";

/// Product fields returned by `aliexpress.affiliate.productdetail.get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiProduct {
    pub title: String,
    pub image_url: Option<String>,
    pub price: Option<String>,
    pub currency: String,
}

/// One entry of `aliexpress.affiliate.link.generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionLink {
    pub source_value: String,
    pub promotion_link: String,
}

/// Numbers and strings both show up for codes and prices.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unwraps the response envelope and returns the `result` payload, or
/// `Value::Null` when the call succeeded without one.
fn unwrap_envelope<'a>(body: &'a Value, envelope: &str) -> Result<&'a Value> {
    if let Some(err) = body.get("error_response") {
        return Err(Error::Api {
            code: err.get("code").and_then(scalar_to_string).unwrap_or_else(|| "N/A".to_string()),
            message: err
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("Unknown API error")
                .to_string(),
        });
    }

    let response = body
        .get(envelope)
        .ok_or_else(|| Error::UnexpectedResponse(format!("missing '{}' key", envelope)))?;
    let resp_result = response
        .get("resp_result")
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::UnexpectedResponse("missing 'resp_result' key".to_string()))?;

    let code = resp_result.get("resp_code").and_then(scalar_to_string);
    if code.as_deref() != Some("200") {
        return Err(Error::Api {
            code: code.unwrap_or_else(|| "N/A".to_string()),
            message: resp_result
                .get("resp_msg")
                .and_then(Value::as_str)
                .unwrap_or("Unknown response message")
                .to_string(),
        });
    }

    Ok(resp_result.get("result").unwrap_or(&Value::Null))
}

/// Reads the first product out of a product-detail response. `Ok(None)`
/// means the call worked but the product is not in the affiliate catalogue.
pub fn parse_product_detail(
    body: &Value,
    product_id: &str,
    default_currency: &str,
) -> Result<Option<ApiProduct>> {
    let result = unwrap_envelope(body, PRODUCT_DETAIL_ENVELOPE)?;
    let product = match result
        .get("products")
        .and_then(|p| p.get("product"))
        .and_then(Value::as_array)
        .and_then(|list| list.first())
    {
        Some(p) => p,
        None => {
            warn!("No products found in API response for ID {}", product_id);
            return Ok(None);
        }
    };

    Ok(Some(ApiProduct {
        title: product
            .get("product_title")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| format!("Product {}", product_id)),
        image_url: product.get("product_main_image_url").and_then(scalar_to_string),
        price: product.get("target_sale_price").and_then(scalar_to_string),
        currency: product
            .get("target_sale_price_currency")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| default_currency.to_string()),
    }))
}

/// Reads the promotion links out of a link-generate response, skipping
/// malformed entries.
pub fn parse_link_generate(body: &Value) -> Result<Vec<PromotionLink>> {
    let result = unwrap_envelope(body, LINK_GENERATE_ENVELOPE)?;
    if result.is_null() {
        return Err(Error::UnexpectedResponse("missing 'result' key".to_string()));
    }

    let items = match result
        .get("promotion_links")
        .and_then(|p| p.get("promotion_link"))
        .and_then(Value::as_array)
    {
        Some(items) => items,
        None => {
            warn!("No 'promotion_links' list in link response: {}", result);
            return Ok(Vec::new());
        }
    };

    let mut links = Vec::with_capacity(items.len());
    for item in items {
        let source = item.get("source_value").and_then(scalar_to_string);
        let link = item.get("promotion_link").and_then(scalar_to_string);
        match (source, link) {
            (Some(source_value), Some(promotion_link)) => links.push(PromotionLink {
                source_value,
                promotion_link,
            }),
            _ => warn!("Missing 'source_value' or 'promotion_link' in link item: {}", item),
        }
    }
    Ok(links)
}
