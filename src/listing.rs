use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::LISTING_ENDPOINT;
use crate::error::ArchiveError;
use crate::post_key::view_url;

/// (blog owner, category number) pair naming one collection of posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRef {
    pub blog_id: String,
    pub category_no: String,
}

/// Backend title-list endpoint; returns the raw body of one page.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_page(&self, category: &CategoryRef, page: u32, page_size: u32) -> Result<String>;
}

pub struct NaverListing {
    client: reqwest::Client,
    endpoint: String,
}

impl NaverListing {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, endpoint: LISTING_ENDPOINT.to_string() }
    }
}

#[async_trait]
impl ListingSource for NaverListing {
    async fn fetch_page(&self, category: &CategoryRef, page: u32, page_size: u32) -> Result<String> {
        let page = page.to_string();
        let size = page_size.to_string();
        let params = [
            ("blogId", category.blog_id.as_str()),
            ("categoryNo", category.category_no.as_str()),
            ("parentCategoryNo", "0"),
            ("currentPage", page.as_str()),
            ("countPerPage", size.as_str()),
        ];
        let body = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .context("Failed to read listing response")?;
        Ok(body)
    }
}

#[derive(Debug, Clone)]
pub struct EnumerateOptions {
    pub page_size: u32,
    pub page_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for EnumerateOptions {
    fn default() -> Self {
        Self {
            page_size: 30,
            page_delay: Duration::from_millis(250),
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingPage {
    #[serde(default)]
    total_count: Option<Value>,
    #[serde(default)]
    post_list: Option<Vec<ListingEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingEntry {
    #[serde(default)]
    log_no: Option<Value>,
}

/// Page through a category until a page is empty or adds nothing new.
///
/// `seen` is the run-scoped set of identifiers; URLs come back in listing order.
pub async fn enumerate_category<S: ListingSource + ?Sized>(
    source: &S,
    category: &CategoryRef,
    opts: &EnumerateOptions,
    seen: &mut HashSet<String>,
) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut page = 1u32;
    let mut total_reported: Option<String> = None;

    loop {
        let listing = fetch_decoded(source, category, page, opts).await?;
        if total_reported.is_none() {
            total_reported = listing.total_count.as_ref().and_then(id_text);
        }

        let posts = listing.post_list.unwrap_or_default();
        debug!(
            "Listing page={} got {} (total={})",
            page,
            posts.len(),
            total_reported.as_deref().unwrap_or("?")
        );
        if posts.is_empty() {
            break;
        }

        let mut added = 0usize;
        for post in &posts {
            let Some(log_no) = post.log_no.as_ref().and_then(id_text) else {
                continue;
            };
            if seen.insert(log_no.clone()) {
                out.push(view_url(&category.blog_id, &log_no));
                added += 1;
            }
        }

        if added == 0 {
            warn!("Listing page {} repeated already-seen posts; stopping", page);
            break;
        }

        page += 1;
        tokio::time::sleep(opts.page_delay).await;
    }

    info!(
        "Enumerated {} posts in category {} (server totalCount={})",
        out.len(),
        category.category_no,
        total_reported.as_deref().unwrap_or("?")
    );
    Ok(out)
}

/// One decode retry after a short pause; the second failure is fatal.
async fn fetch_decoded<S: ListingSource + ?Sized>(
    source: &S,
    category: &CategoryRef,
    page: u32,
    opts: &EnumerateOptions,
) -> Result<ListingPage> {
    let body = source.fetch_page(category, page, opts.page_size).await?;
    match decode_listing(&body) {
        Ok(listing) => Ok(listing),
        Err(e) => {
            warn!("Listing JSON parse error at page={} ({}); retrying once", page, e);
            tokio::time::sleep(opts.retry_delay).await;
            let body = source.fetch_page(category, page, opts.page_size).await?;
            decode_listing(&body).map_err(|source| ArchiveError::ListingDecode { page, source }.into())
        }
    }
}

fn decode_listing(body: &str) -> serde_json::Result<ListingPage> {
    serde_json::from_str(body).or_else(|err| {
        if body.contains("\\'") {
            serde_json::from_str(&repair_apostrophes(body)).map_err(|_| err)
        } else {
            Err(err)
        }
    })
}

/// The endpoint escapes apostrophes in titles as `\'`, which is not valid JSON.
/// Only an apostrophe behind an odd run of backslashes is such an escape.
fn repair_apostrophes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut run = 0usize;
    for ch in body.chars() {
        match ch {
            '\\' => run += 1,
            '\'' if run % 2 == 1 => {
                out.pop();
                run = 0;
            }
            _ => run = 0,
        }
        out.push(ch);
    }
    out
}

fn id_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
