//! Page transport over plain HTTP with browser emulation.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36";
const LOCALE_COOKIES: &str = "x-hng=lang=en-US; intl_locale=en_US";
const MAX_REDIRECTS: usize = 10;

/// A fetched page. `url` is where the redirects ended up.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page>;
}

/// Fetches pages with a Chrome-emulating client and follows redirects by hand
/// so the final URL is always known.
pub struct HttpFetcher {
    client: wreq::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, proxy_url: Option<&str>) -> Result<Self> {
        let mut builder = wreq::Client::builder()
            .emulation(wreq_util::Emulation::Chrome131)
            .redirect(wreq::redirect::Policy::none())
            .timeout(timeout);
        // without a configured proxy, system proxy variables are ignored
        builder = match proxy_url {
            Some(proxy_url) => builder.proxy(wreq::Proxy::all(proxy_url)?),
            None => builder.no_proxy(),
        };
        Ok(Self {
            client: builder.build()?,
        })
    }

    async fn get(&self, url: &str, user_agent: &str) -> Result<wreq::Response> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", user_agent)
            .header("Cookie", LOCALE_COOKIES)
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, original_url: &str) -> Result<Page> {
        let mut current_url = original_url.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let mut resp = self.get(&current_url, DESKTOP_UA).await?;
            let mut status = resp.status();

            if status.as_u16() == 403 {
                debug!("HTTP 403, retrying with mobile UA url={}", current_url);
                resp = self.get(&current_url, MOBILE_UA).await?;
                status = resp.status();
            }

            let code = status.as_u16();
            if (300..400).contains(&code) {
                let location = resp
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match location {
                    Some(loc) => {
                        let next_url = match Url::parse(&current_url).and_then(|base| base.join(&loc)) {
                            Ok(u) => u.to_string(),
                            Err(_) => loc,
                        };
                        debug!("redirect {} -> {}", current_url, next_url);
                        current_url = next_url;
                        continue;
                    }
                    None => {
                        warn!("HTTP {} with no usable Location header url={}", code, current_url);
                        return Ok(Page {
                            url: current_url,
                            status: code,
                            body: String::new(),
                        });
                    }
                }
            }

            let body = resp.text().await?;
            info!("fetched {} bytes status={} url={}", body.len(), code, current_url);
            return Ok(Page {
                url: current_url,
                status: code,
                body,
            });
        }

        Err(Error::TooManyRedirects(original_url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every request with `handler(path, user_agent)`, one connection
    /// per request. Returns the server's base URL.
    async fn serve(handler: fn(&str, &str) -> String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&request).into_owned();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let user_agent = request
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("user-agent")
                                .then(|| value.trim().to_string())
                        })
                        .unwrap_or_default();
                    let response = handler(&path, &user_agent);
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn response(status: &str, location: Option<&str>, body: &str) -> String {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        if let Some(location) = location {
            out.push_str(&format!("Location: {}\r\n", location));
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), None).unwrap()
    }

    #[tokio::test]
    async fn test_follows_relative_redirects_to_final_url() {
        let base = serve(|path, _| match path {
            "/e/_short" => response("302 Found", Some("hop"), ""),
            "/e/hop" => response("301 Moved Permanently", Some("/item/42.html?x=1"), ""),
            "/item/42.html?x=1" => response("200 OK", None, "<h1>Lamp</h1>"),
            _ => response("404 Not Found", None, ""),
        })
        .await;

        let page = fetcher().fetch(&format!("{}/e/_short", base)).await.unwrap();

        assert_eq!(page.url, format!("{}/item/42.html?x=1", base));
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<h1>Lamp</h1>");
    }

    #[tokio::test]
    async fn test_redirect_loop_gives_up() {
        let base = serve(|_, _| response("302 Found", Some("/loop"), "")).await;

        let err = fetcher().fetch(&format!("{}/start", base)).await.unwrap_err();

        match err {
            Error::TooManyRedirects(url) => assert_eq!(url, format!("{}/start", base)),
            other => panic!("expected too many redirects, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forbidden_retried_with_mobile_agent() {
        let base = serve(|_, user_agent| {
            if user_agent.contains("Mobile") {
                response("200 OK", None, "mobile page")
            } else {
                response("403 Forbidden", None, "")
            }
        })
        .await;

        let page = fetcher().fetch(&format!("{}/item/1.html", base)).await.unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.body, "mobile page");
    }

    #[tokio::test]
    async fn test_error_status_returned_in_page() {
        let base = serve(|_, _| response("503 Service Unavailable", None, "busy")).await;

        let page = fetcher().fetch(&format!("{}/item/1.html", base)).await.unwrap();

        assert_eq!(page.status, 503);
        assert_eq!(page.body, "busy");
        assert!(!page.is_ok());
    }

    #[tokio::test]
    async fn test_redirect_without_location_stops() {
        let base = serve(|_, _| response("302 Found", None, "")).await;
        let url = format!("{}/item/1.html", base);

        let page = fetcher().fetch(&url).await.unwrap();

        assert_eq!(page.status, 302);
        assert_eq!(page.url, url);
        assert!(page.body.is_empty());
    }

    #[test]
    fn test_only_200_counts_as_loaded() {
        let page = |status| Page {
            url: "https://www.aliexpress.com/item/1.html".to_string(),
            status,
            body: String::new(),
        };
        assert!(page(200).is_ok());
        assert!(!page(204).is_ok());
        assert!(!page(302).is_ok());
    }

    #[tokio::test]
    async fn test_builds_with_proxy() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5), Some("http://127.0.0.1:8080"));
        assert!(fetcher.is_ok());
    }
}
