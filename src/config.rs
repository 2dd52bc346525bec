//! Runtime settings, read from flags or the environment.

use crate::error::{Error, Result};
use crate::message::Button;
use clap::Args;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api-sg.aliexpress.com/sync";
/// Ten years.
pub const MAX_CACHE_EXPIRY_SECS: u64 = 10 * 365 * 86_400;

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Affiliate API app key
    #[arg(long, env = "ALIEXPRESS_APP_KEY", hide_env_values = true)]
    pub app_key: Option<String>,

    /// Affiliate API app secret
    #[arg(long, env = "ALIEXPRESS_APP_SECRET", hide_env_values = true)]
    pub app_secret: Option<String>,

    /// Tracking id credited for generated links
    #[arg(long, env = "ALIEXPRESS_TRACKING_ID", default_value = "default")]
    pub tracking_id: String,

    #[arg(long, env = "ALIEXPRESS_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[arg(long, env = "TARGET_CURRENCY", default_value = "USD")]
    pub currency: String,

    #[arg(long, env = "TARGET_LANGUAGE", default_value = "en")]
    pub language: String,

    /// Ship-to country used for prices and short-link resolution
    #[arg(long, env = "QUERY_COUNTRY", default_value = "US")]
    pub country: String,

    /// Lifetime of cached products, links and resolved short links
    #[arg(
        long,
        env = "CACHE_EXPIRY_SECONDS",
        default_value_t = 86_400,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CACHE_EXPIRY_SECS)
    )]
    pub cache_expiry_secs: u64,

    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 15)]
    pub http_timeout_secs: u64,

    /// Optional proxy for product page fetches
    #[arg(long, env = "SCRAPER_PROXY_URL")]
    pub proxy_url: Option<String>,

    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// Italic line appended to product replies
    #[arg(long, env = "REPLY_FOOTER")]
    pub footer: Option<String>,

    /// Reply buttons as `Label|url` pairs separated by `;`
    #[arg(long, env = "REPLY_BUTTONS")]
    pub buttons: Option<String>,
}

/// Key and secret for the affiliate API.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_key: String,
    pub app_secret: String,
}

impl Settings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Returns the API credentials, naming whichever variables are missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let key = self.app_key.clone().filter(|s| !s.is_empty());
        let secret = self.app_secret.clone().filter(|s| !s.is_empty());
        match (key, secret) {
            (Some(app_key), Some(app_secret)) => Ok(Credentials { app_key, app_secret }),
            (key, secret) => {
                let mut missing = Vec::new();
                if key.is_none() {
                    missing.push("ALIEXPRESS_APP_KEY");
                }
                if secret.is_none() {
                    missing.push("ALIEXPRESS_APP_SECRET");
                }
                Err(Error::Config(format!(
                    "missing environment variables: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Parses `REPLY_BUTTONS` into keyboard rows of at most three buttons.
    pub fn button_rows(&self) -> Result<Vec<Vec<Button>>> {
        let raw = match self.buttons.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(Vec::new()),
        };
        let mut buttons = Vec::new();
        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (text, url) = pair.split_once('|').ok_or_else(|| {
                Error::Config(format!("reply button '{}' is not in Label|url form", pair))
            })?;
            url::Url::parse(url.trim())?;
            buttons.push(Button {
                text: text.trim().to_string(),
                url: url.trim().to_string(),
            });
        }
        Ok(buttons.chunks(3).map(|row| row.to_vec()).collect())
    }
}

/// Builds settings from command-line style arguments, for tests.
#[cfg(test)]
pub(crate) fn try_settings_from_args(args: &[&str]) -> std::result::Result<Settings, clap::Error> {
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    let mut argv = vec!["test"];
    argv.extend_from_slice(args);
    TestCli::try_parse_from(argv).map(|cli| cli.settings)
}

#[cfg(test)]
pub(crate) fn settings_from_args(args: &[&str]) -> Settings {
    match try_settings_from_args(args) {
        Ok(settings) => settings,
        Err(e) => panic!("invalid test arguments {:?}: {}", args, e),
    }
}
