use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};

use crate::config::{PLATFORM_HOST, USER_AGENT};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Plain GET of a page body, bypassing the renderer.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Client shared by the listing endpoint and the static fetch fallback.
pub fn build_client(blog_id: Option<&str>) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let referer = match blog_id {
        Some(id) => format!("{}/{}", PLATFORM_HOST, id),
        None => format!("{}/", PLATFORM_HOST),
    };
    headers.insert(REFERER, HeaderValue::from_str(&referer)?);
    headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

#[async_trait]
impl PageFetcher for reqwest::Client {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let text = self
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        Ok(text)
    }
}
