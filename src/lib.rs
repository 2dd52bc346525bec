//! Turns AliExpress product links found in chat messages into affiliate
//! links for each promotional offer, with a formatted reply per product.
//!
//! Product data comes from the affiliate API when it answers, from the
//! public product page when it does not, and from placeholders otherwise.

pub mod affiliate;
pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod html_extractor;
pub mod linker;
pub mod links;
pub mod message;
pub mod offers;
pub mod resolver;
pub mod webdriver;

#[cfg(test)]
mod testing;

pub use cache::TtlCache;
pub use catalog::{DetailsSource, Price, ProductCatalog, ProductDetails};
pub use config::Settings;
pub use error::{Error, Result};
pub use linker::{CacheSweep, Linker};
pub use message::{Button, Reply};
pub use offers::Offer;
