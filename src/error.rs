//! Error types for the linker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] wreq::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Too many redirects starting from {0}")]
    TooManyRedirects(String),

    #[error("WebDriver error: {0}")]
    WebDriver(String),
}

pub type Result<T> = std::result::Result<T, Error>;
