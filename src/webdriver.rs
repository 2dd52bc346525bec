//! Headless-browser page transport for pages that only render with JavaScript.

use crate::error::{Error, Result};
use crate::fetch::{Page, PageFetcher};
use async_trait::async_trait;
use fantoccini::ClientBuilder;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub struct WebDriverFetcher {
    endpoint: String,
    settle: Duration,
}

impl WebDriverFetcher {
    /// `endpoint` is a running chromedriver (or compatible) server.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            settle: Duration::from_secs(5),
        }
    }

    /// How long to let the page's scripts run before reading the DOM.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn capabilities() -> serde_json::Map<String, serde_json::Value> {
        let mut caps = serde_json::Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": ["--headless", "--no-sandbox", "--disable-dev-shm-usage"] }),
        );
        caps
    }
}

#[async_trait]
impl PageFetcher for WebDriverFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        let client = ClientBuilder::native()
            .capabilities(Self::capabilities())
            .connect(&self.endpoint)
            .await
            .map_err(|e| Error::WebDriver(format!("failed to connect to {}: {}", self.endpoint, e)))?;

        let rendered = async {
            client.goto(url).await?;
            tokio::time::sleep(self.settle).await;
            let body = client.source().await?;
            let final_url = client.current_url().await?;
            Ok::<_, fantoccini::error::CmdError>((final_url.to_string(), body))
        }
        .await;

        // the browser session is closed whether or not rendering worked
        if let Err(e) = client.close().await {
            warn!("Failed to close WebDriver session: {}", e);
        }

        let (final_url, body) = rendered.map_err(|e| Error::WebDriver(e.to_string()))?;
        info!("rendered {} bytes url={}", body.len(), final_url);
        Ok(Page {
            url: final_url,
            status: 200,
            body,
        })
    }
}
