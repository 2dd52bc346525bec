//! Chat replies and the fixed texts the linker sends.

use crate::catalog::{DetailsSource, ProductDetails};
use crate::offers::Offer;
use serde::Serialize;

const MAX_TITLE_CHARS: usize = 250;

pub const WELCOME: &str =
    "Hello! Send me an AliExpress product link, and I'll try to generate affiliate links for it.";
pub const LINK_PROMPT: &str = "Please send an AliExpress product link to generate affiliate links.";
pub const NO_LINKS: &str =
    "❌ No AliExpress links found in your message. Please send a valid AliExpress product link.";
pub const NO_VALID_LINKS: &str =
    "❌ We couldn't find any valid AliExpress product links in your message ❌";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub text: String,
    pub url: String,
}

/// One outgoing chat message. `text` is HTML; when `photo` is set the text
/// is sent as its caption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Vec<Button>>,
    pub disable_preview: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            photo: None,
            buttons: Vec::new(),
            disable_preview: false,
        }
    }

    fn with_buttons(mut self, buttons: &[Vec<Button>]) -> Self {
        self.buttons = buttons.to_vec();
        self
    }
}

/// Footer and keyboard attached to every product reply.
#[derive(Debug, Clone, Default)]
pub struct ReplyStyle {
    pub footer: Option<String>,
    pub buttons: Vec<Vec<Button>>,
}

pub fn processing_notice(count: usize) -> Reply {
    Reply::text(format!(
        "⏳ Processing {} AliExpress products from your message. Please wait...",
        count
    ))
}

pub fn unexpected_error(product_id: &str) -> Reply {
    Reply::text(format!(
        "An unexpected error occurred while processing product ID {}. Sorry!",
        product_id
    ))
}

/// Truncated to the caption-safe length, then HTML-escaped.
fn escaped_title(title: &str) -> String {
    let truncated: String = title.chars().take(MAX_TITLE_CHARS).collect();
    html_escape::encode_text(&truncated).into_owned()
}

fn price_section(details: &ProductDetails) -> String {
    match (&details.source, &details.price) {
        (DetailsSource::Placeholder, _) => "\n<b>Product details unavailable</b>\n".to_string(),
        (_, Some(price)) => format!(
            "\n<b>Sale Price:</b> {}\n",
            html_escape::encode_text(&price.display())
        ),
        (_, None) => "\n<b>Sale Price:</b> Unavailable\n".to_string(),
    }
}

/// Formats the reply for one product. `offer_links` holds the generated link
/// per offer; offers missing from it are shown as failed.
pub fn product_reply(
    details: &ProductDetails,
    offer_links: &[(Offer, Option<String>)],
    style: &ReplyStyle,
) -> Reply {
    let title = escaped_title(&details.title);
    let link_for = |offer: Offer| {
        offer_links
            .iter()
            .find(|(o, _)| *o == offer)
            .and_then(|(_, link)| link.as_deref())
    };

    if Offer::ALL.iter().all(|offer| link_for(*offer).is_none()) {
        let mut reply = Reply::text(format!(
            "<b>{}</b>\n\nWe couldn't find an offer for this product.",
            title
        ))
        .with_buttons(&style.buttons);
        reply.disable_preview = true;
        return reply;
    }

    let mut lines = vec![format!("<b>{}</b>", title), price_section(details)];
    lines.push("<b>Offers:</b>".to_string());
    for offer in Offer::ALL {
        match link_for(offer) {
            Some(link) => lines.push(format!(
                "{}: <a href=\"{}\">Click Here</a>",
                offer.label(),
                html_escape::encode_double_quoted_attribute(link)
            )),
            None => lines.push(format!("{}: ❌ Failed", offer.label())),
        }
    }
    if let Some(footer) = style.footer.as_deref().filter(|f| !f.trim().is_empty()) {
        lines.push(format!("\n<i>{}</i>", html_escape::encode_text(footer)));
    }

    Reply {
        text: lines.join("\n"),
        disable_preview: details.image_url.is_none(),
        photo: details.image_url.clone(),
        buttons: style.buttons.clone(),
    }
}
