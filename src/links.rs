//! Recognising AliExpress links in chat text and rewriting them into
//! product pages and offer targets.

use lazy_static::lazy_static;
use regex::{NoExpand, Regex};
use tracing::{debug, warn};
use url::Url;

const SHARE_PREFIX: &str = "https://star.aliexpress.com/share/share.htm?&redirectUrl=";

lazy_static! {
    static ref CANDIDATE_RE: Regex = Regex::new(
        r#"(?i)https?://[^\s<>"]+|www\.[^\s<>"]+|\b(?:s\.click\.|a\.)?aliexpress\.(?:com|ru|es|fr|pt|it|pl|nl|co\.kr|co\.jp|com\.br|com\.tr|com\.vn|us|id|th|ar)(?:\.[\w-]+)?/[^\s<>"]*"#
    )
    .unwrap();
    static ref MENTION_RE: Regex = Regex::new(
        r"(?i)aliexpress\.(?:com|ru|es|fr|pt|it|pl|nl|co\.kr|co\.jp|com\.br|com\.tr|com\.vn|us|id|th|ar)"
    )
    .unwrap();
    static ref SCHEMELESS_RE: Regex = Regex::new(
        r"(?i)^(?:[\w-]+\.){0,3}aliexpress\.(?:com|ru|es|fr|pt|it|pl|nl|co\.kr|co\.jp|com\.br|com\.tr|com\.vn|us|id|th|ar)"
    )
    .unwrap();
    static ref PRODUCT_HOST_RE: Regex = Regex::new(
        r"(?i)^(?:[\w-]+\.)?aliexpress\.(?:com|ru|es|fr|pt|it|pl|nl|co\.kr|co\.jp|com\.br|com\.tr|com\.vn|us)$"
    )
    .unwrap();
    static ref SHORT_LINK_RE: Regex = Regex::new(
        r"(?i)^https?://(?:s\.click\.aliexpress\.com/e/|a\.aliexpress\.com/_)[a-zA-Z0-9_-]+/?"
    )
    .unwrap();
    static ref SHIP_TO_RE: Regex = Regex::new(r"_randl_shipto=[^&]+").unwrap();
    static ref PRODUCT_ID_PATTERNS: Vec<Regex> = [
        r"/item/(\d+)\.html",
        r"/p/[^/]+/(\d+)\.html",
        r"product/(\d+)",
        r"productIds=(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

/// What a candidate URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A regular (possibly country-specific) AliExpress page.
    Product,
    /// An `s.click` / `a.aliexpress` redirect that has to be followed.
    Short,
    Other,
}

/// Finds every token in `text` that could be an AliExpress link.
pub fn extract_candidate_urls(text: &str) -> Vec<String> {
    CANDIDATE_RE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '\''))
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn mentions_aliexpress(text: &str) -> bool {
    MENTION_RE.is_match(text)
}

/// Gives scheme-less AliExpress tokens an `https://` prefix. Tokens without
/// a scheme that do not look like AliExpress are dropped.
pub fn normalize_scheme(candidate: &str) -> Option<String> {
    let lower = candidate.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(candidate.to_string());
    }
    if SCHEMELESS_RE.is_match(candidate) {
        debug!("Prepending https:// to potential URL: {}", candidate);
        return Some(format!("https://{}", candidate));
    }
    debug!("Skipping potential URL without scheme or known domain: {}", candidate);
    None
}

pub fn classify(url: &str) -> LinkKind {
    if SHORT_LINK_RE.is_match(url) {
        return LinkKind::Short;
    }
    let host = match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return LinkKind::Other,
        },
        Err(_) => return LinkKind::Other,
    };
    if host.starts_with("a.") || host.starts_with("s.click.") {
        return LinkKind::Other;
    }
    if PRODUCT_HOST_RE.is_match(&host) {
        LinkKind::Product
    } else {
        LinkKind::Other
    }
}

/// Rewrites the US storefront onto the global `.com` domain.
pub fn to_com_domain(url: &str) -> String {
    url.replace(".aliexpress.us", ".aliexpress.com")
}

pub fn extract_product_id(url: &str) -> Option<String> {
    let url = to_com_domain(url);
    for (idx, pattern) in PRODUCT_ID_PATTERNS.iter().enumerate() {
        if let Some(id) = pattern.captures(&url).and_then(|c| c.get(1)) {
            if idx > 0 {
                debug!("Extracted product ID {} using alternative pattern {}", id.as_str(), pattern);
            }
            return Some(id.as_str().to_string());
        }
    }
    warn!("Could not extract product ID from URL: {}", url);
    None
}

/// `scheme://host/item/<id>.html` with query and fragment dropped.
pub fn clean_product_url(url: &str, product_id: &str) -> Option<String> {
    let mut parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => {
            warn!("Could not parse or reconstruct URL {}: {}", url, e);
            return None;
        }
    };
    parsed.set_path(&format!("/item/{}.html", product_id));
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

pub fn with_ship_to(url: &str, country: &str) -> String {
    SHIP_TO_RE
        .replace_all(url, NoExpand(&format!("_randl_shipto={}", country)))
        .into_owned()
}

/// Wraps a URL in the share redirect used as a link-generation source.
/// Already wrapped URLs are returned unchanged.
pub fn share_wrapped(url: &str) -> String {
    if url.contains("star.aliexpress.com/share/share.htm") {
        url.to_string()
    } else {
        format!("{}{}", SHARE_PREFIX, url)
    }
}

/// Builds the share-wrapped target URL for one offer: country subdomains are
/// dropped and the query is replaced by `params`.
pub fn offer_target_url(base_url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base_url.to_string();
    }
    let mut parsed = match Url::parse(base_url) {
        Ok(u) => u,
        Err(e) => {
            warn!("Error building URL with params for base {}: {}", base_url, e);
            return base_url.to_string();
        }
    };

    if let Some(host) = parsed.host_str().map(str::to_string) {
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() > 2 && parts[parts.len() - 2].contains("aliexpress") {
            let root = format!("aliexpress.{}", parts[parts.len() - 1]);
            if parsed.set_host(Some(&root)).is_err() {
                warn!("Could not rewrite host {} to {}", host, root);
            }
        }
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    parsed.set_query(Some(&query));
    parsed.set_fragment(None);
    share_wrapped(parsed.as_str())
}

pub fn product_page_url(product_id: &str) -> String {
    format!("https://www.aliexpress.com/item/{}.html", product_id)
}

pub fn coin_page_url(product_id: &str) -> String {
    format!(
        "https://m.aliexpress.com/p/coin-index/index.html?productIds={}&channel=coin&sourceType=620",
        product_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offers::Offer;

    #[test]
    fn test_extract_candidates_from_chat_text() {
        let text = "look https://www.aliexpress.com/item/1005001.html?spm=x, and \
                    s.click.aliexpress.com/e/_DabC12 also www.example.org/page.";
        let found = extract_candidate_urls(text);
        assert_eq!(
            found,
            vec![
                "https://www.aliexpress.com/item/1005001.html?spm=x",
                "s.click.aliexpress.com/e/_DabC12",
                "www.example.org/page",
            ]
        );
    }

    #[test]
    fn test_extract_candidates_none() {
        assert!(extract_candidate_urls("no links here").is_empty());
    }

    #[test]
    fn test_mentions_aliexpress() {
        assert!(mentions_aliexpress("got it on AliExpress.com yesterday"));
        assert!(mentions_aliexpress("https://www.aliexpress.us/item/1.html"));
        assert!(!mentions_aliexpress("express delivery from ali"));
    }

    #[test]
    fn test_normalize_scheme() {
        assert_eq!(
            normalize_scheme("HTTPS://aliexpress.com/item/1.html").as_deref(),
            Some("HTTPS://aliexpress.com/item/1.html")
        );
        assert_eq!(
            normalize_scheme("a.aliexpress.com/_mKx1").as_deref(),
            Some("https://a.aliexpress.com/_mKx1")
        );
        assert_eq!(
            normalize_scheme("fr.aliexpress.com/item/2.html").as_deref(),
            Some("https://fr.aliexpress.com/item/2.html")
        );
        assert_eq!(normalize_scheme("www.example.org/page"), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("https://s.click.aliexpress.com/e/_DabC12"), LinkKind::Short);
        assert_eq!(classify("https://a.aliexpress.com/_mKx1"), LinkKind::Short);
        assert_eq!(classify("https://aliexpress.com/item/1.html"), LinkKind::Product);
        assert_eq!(classify("https://ar.aliexpress.com/item/1.html"), LinkKind::Product);
        assert_eq!(classify("https://www.aliexpress.us/item/1.html"), LinkKind::Product);
        assert_eq!(classify("https://aliexpress.com.evil.org/item/1.html"), LinkKind::Other);
        assert_eq!(classify("https://a.aliexpress.com/"), LinkKind::Other);
        assert_eq!(classify("https://example.org/item/1.html"), LinkKind::Other);
    }

    #[test]
    fn test_extract_product_id_patterns() {
        assert_eq!(
            extract_product_id("https://www.aliexpress.com/item/1005006123.html?spm=a").as_deref(),
            Some("1005006123")
        );
        assert_eq!(
            extract_product_id("https://aliexpress.ru/p/some-slug/4001.html").as_deref(),
            Some("4001")
        );
        assert_eq!(
            extract_product_id("https://m.aliexpress.com/product/777").as_deref(),
            Some("777")
        );
        assert_eq!(
            extract_product_id(&coin_page_url("555")).as_deref(),
            Some("555")
        );
        assert_eq!(extract_product_id("https://www.aliexpress.com/"), None);
    }

    #[test]
    fn test_us_domain_is_rewritten() {
        assert_eq!(
            to_com_domain("https://www.aliexpress.us/item/1.html"),
            "https://www.aliexpress.com/item/1.html"
        );
    }

    #[test]
    fn test_clean_product_url() {
        assert_eq!(
            clean_product_url("https://es.aliexpress.com/item/42.html?spm=1#reviews", "42").as_deref(),
            Some("https://es.aliexpress.com/item/42.html")
        );
        assert_eq!(clean_product_url("not a url", "42"), None);
    }

    #[test]
    fn test_with_ship_to() {
        assert_eq!(
            with_ship_to("https://aliexpress.com/item/1.html?a=1&_randl_shipto=US&b=2", "DZ"),
            "https://aliexpress.com/item/1.html?a=1&_randl_shipto=DZ&b=2"
        );
    }

    #[test]
    fn test_offer_target_url_strips_country_subdomain() {
        let target = offer_target_url(
            "https://ar.aliexpress.com/item/42.html",
            &Offer::Coin.params(),
        );
        assert_eq!(
            target,
            "https://star.aliexpress.com/share/share.htm?&redirectUrl=\
             https://aliexpress.com/item/42.html?sourceType=620&channel=coin&afSmartRedirect=y"
        );
    }

    #[test]
    fn test_offer_target_url_without_params() {
        let base = "https://aliexpress.com/item/42.html";
        assert_eq!(offer_target_url(base, &[]), base);
    }

    #[test]
    fn test_share_wrapped_is_idempotent() {
        let once = share_wrapped("https://aliexpress.com/item/1.html");
        assert_eq!(share_wrapped(&once), once);
    }
}
