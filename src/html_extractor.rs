use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;

lazy_static! {
    // Layout-specific title location on desktop item pages.
    static ref ROOT_TITLE: Selector = Selector::parse(
        "#root div > div:nth-of-type(1) > div > div:nth-of-type(1) > div:nth-of-type(1) > div:nth-of-type(2) > div:nth-of-type(4) > h1"
    )
    .unwrap();
    static ref OG_TITLE: Selector = Selector::parse("meta[property='og:title']").unwrap();
    static ref KEYWORDS: Selector = Selector::parse("meta[name='keywords']").unwrap();
    static ref DATA_PL_TITLE: Selector = Selector::parse("h1[data-pl='product-title']").unwrap();
    static ref CLASS_TITLE: Selector = Selector::parse("h1[class*='product-title']").unwrap();
    static ref ANY_H1: Selector = Selector::parse("h1").unwrap();
    static ref MAGNIFIER_IMAGE: Selector = Selector::parse("img[class*='magnifier--image']").unwrap();
    static ref OG_IMAGE: Selector = Selector::parse("meta[property='og:image']").unwrap();
    static ref PRICE_VALUE: Selector = Selector::parse("span.product-price-value").unwrap();
    static ref SPAN: Selector = Selector::parse("span").unwrap();
    static ref SCRIPT: Selector = Selector::parse("script").unwrap();

    static ref TITLE_SUFFIX_RE: Regex = Regex::new(r"\s*-\s*AliExpress(\s+\d+)?$").unwrap();
    static ref SUBJECT_RE: Regex = Regex::new(r#""subject"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap();
    static ref IMAGE_LIST_RE: Regex = Regex::new(r#""imagePathList"\s*:\s*\[([^\]]+)\]"#).unwrap();
    static ref IMAGE_URL_RE: Regex = Regex::new(r#"https?://[^"']+\.(?:jpg|jpeg|png|webp)"#).unwrap();
    static ref PRICE_RES: Vec<Regex> = [
        r#""formatedActivityPrice"\s*:\s*"([^"]+)""#,
        r#""formatedAmount"\s*:\s*"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

const INLINE_DATA_INDICATORS: [&str; 3] = ["window.runParams", "__INIT_DATA__", "__INITIAL_STATE__"];

/// Fields recoverable from a public product page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrapedProduct {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<String>,
    pub coins_discount: Option<String>,
}

impl ScrapedProduct {
    /// A scrape only counts when it found a title.
    pub fn is_usable(&self) -> bool {
        self.title.is_some()
    }
}

pub struct ProductPageExtractor;

impl ProductPageExtractor {
    pub fn extract(html: &str) -> ScrapedProduct {
        let document = Html::parse_document(html);
        let inline_data = Self::inline_data(&document);

        let title = Self::extract_title(&document)
            .or_else(|| Self::inline_title(&inline_data))
            .map(|t| clean_title(&t))
            .filter(|t| !t.is_empty());

        let image_url = Self::extract_image(&document)
            .or_else(|| Self::inline_image(&inline_data));

        let price = first_text(&document, &PRICE_VALUE).or_else(|| {
            PRICE_RES.iter().find_map(|re| {
                re.captures(&inline_data)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
        });

        // only the span's own text nodes count, not its descendants'
        let coins_discount = document
            .select(&SPAN)
            .find(|el| {
                el.children()
                    .filter_map(|child| child.value().as_text())
                    .any(|text| text.contains("Coins to save"))
            })
            .map(|el| normalized_text(el.text()));

        ScrapedProduct {
            title,
            image_url,
            price,
            coins_discount,
        }
    }

    fn extract_title(document: &Html) -> Option<String> {
        first_text(document, &ROOT_TITLE)
            .or_else(|| meta_content(document, &OG_TITLE))
            .or_else(|| {
                meta_content(document, &KEYWORDS).and_then(|keywords| {
                    keywords
                        .split(',')
                        .next()
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                })
            })
            .or_else(|| first_text(document, &DATA_PL_TITLE))
            .or_else(|| first_text(document, &CLASS_TITLE))
            .or_else(|| first_text(document, &ANY_H1))
    }

    fn extract_image(document: &Html) -> Option<String> {
        document
            .select(&MAGNIFIER_IMAGE)
            .find_map(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(str::to_string)
            .or_else(|| meta_content(document, &OG_IMAGE))
    }

    /// Concatenated text of the untyped scripts that carry the page's
    /// embedded product state.
    fn inline_data(document: &Html) -> String {
        let mut data = String::new();
        for script in document.select(&SCRIPT) {
            if script.value().attr("type").is_some() {
                continue;
            }
            let content = script.text().collect::<String>();
            if INLINE_DATA_INDICATORS.iter().any(|ind| content.contains(ind)) {
                data.push_str(&content);
                data.push('\n');
            }
        }
        data
    }

    fn inline_title(inline_data: &str) -> Option<String> {
        let raw = SUBJECT_RE.captures(inline_data)?.get(1)?.as_str();
        // unescape \uXXXX and friends through the JSON string parser
        let decoded = serde_json::from_str::<String>(&format!("\"{}\"", raw))
            .unwrap_or_else(|_| raw.to_string());
        Some(decoded.trim().to_string()).filter(|t| !t.is_empty())
    }

    fn inline_image(inline_data: &str) -> Option<String> {
        let list = IMAGE_LIST_RE.captures(inline_data)?.get(1)?.as_str();
        IMAGE_URL_RE.find(list).map(|m| m.as_str().to_string())
    }
}

/// Drops the trailing " - AliExpress 123" site suffix from page titles.
pub fn clean_title(title: &str) -> String {
    TITLE_SUFFIX_RE.replace(title.trim(), "").trim().to_string()
}

fn normalized_text<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| normalized_text(el.text()))
        .find(|text| !text.is_empty())
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .find_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}
