use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::USER_AGENT;

pub const OUTER_HTML_SCRIPT: &str = "document.documentElement.outerHTML";
pub const MAIN_FRAME_SRC_SCRIPT: &str = "(() => { \
     const f = document.querySelector('iframe#mainFrame, iframe[name=\"mainFrame\"]'); \
     return f && f.src ? f.src : null; })()";

pub const POST_READY_SELECTORS: &[&str] =
    &[".se-main-container", "#postViewArea", "article", "body"];
pub const MOBILE_READY_SELECTORS: &[&str] = &[".se_publishDate", ".blog_date", "body"];

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Print settings: A4 portrait, backgrounds on, 0.4in margins.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub landscape: bool,
    pub print_background: bool,
    pub scale: f64,
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub margin_in: f64,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            landscape: false,
            print_background: true,
            scale: 1.0,
            paper_width_in: 8.27,
            paper_height_in: 11.69,
            margin_in: 0.4,
        }
    }
}

/// Browser capability the pipeline drives. One session renders one page at a time.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Poll until any selector matches. `Ok(false)` on timeout; callers proceed anyway.
    async fn wait_for_any_of(&self, selectors: &[&str], timeout: Duration) -> Result<bool>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn print_to_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>>;

    async fn current_title(&self) -> Result<String>;
}

/// Serialized DOM of the current page, or an empty string when scripting fails.
pub async fn page_html<R: Renderer + ?Sized>(renderer: &R) -> String {
    match renderer.evaluate(OUTER_HTML_SCRIPT).await {
        Ok(serde_json::Value::String(html)) => html,
        Ok(_) => String::new(),
        Err(e) => {
            debug!("outerHTML unavailable: {}", e);
            String::new()
        }
    }
}

/// Desktop blog pages wrap the post in a `mainFrame` iframe; follow it when present.
pub async fn enter_main_frame<R: Renderer + ?Sized>(renderer: &R, current: &str) -> Result<bool> {
    let src = match renderer.evaluate(MAIN_FRAME_SRC_SCRIPT).await? {
        serde_json::Value::String(s) if !s.is_empty() && s != current => s,
        _ => return Ok(false),
    };
    debug!("Entering main frame: {}", src);
    renderer.navigate(&src).await?;
    Ok(true)
}

pub struct LaunchOptions {
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub profile_dir: Option<String>,
}

/// Owns the Chromium process and its protocol handler task.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Headless Chromium page driven over the DevTools protocol.
pub struct ChromiumRenderer {
    page: Page,
}

impl ChromiumSession {
    /// Launch one browser and open the single page every post is rendered in.
    pub async fn launch(opts: &LaunchOptions) -> Result<(Self, ChromiumRenderer)> {
        let mut builder = BrowserConfig::builder()
            .window_size(1280, 2000)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg(format!("--user-agent={}", USER_AGENT));
        if !opts.headless {
            builder = builder.with_head();
        }
        if let Some(dir) = &opts.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(profile) = &opts.profile_dir {
            builder = builder.arg(format!("--profile-directory={}", profile));
        }
        let config = builder.build().map_err(anyhow::Error::msg)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chromium")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let session = Self { browser, handler };
                session.shutdown().await;
                return Err(e).context("Failed to open a browser page");
            }
        };
        info!("Chromium session started");
        Ok((Self { browser, handler }, ChromiumRenderer { page }))
    }

    /// Close the browser and stop the protocol handler. Errors are logged only.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser wait failed: {}", e);
        }
        self.handler.abort();
        info!("Chromium session closed");
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation failed: {}", url))?;
        Ok(())
    }

    async fn wait_for_any_of(&self, selectors: &[&str], timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            for sel in selectors {
                if self.page.find_element(*sel).await.is_ok() {
                    return Ok(true);
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn print_to_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        let params = PrintToPdfParams {
            landscape: Some(options.landscape),
            print_background: Some(options.print_background),
            scale: Some(options.scale),
            paper_width: Some(options.paper_width_in),
            paper_height: Some(options.paper_height_in),
            margin_top: Some(options.margin_in),
            margin_bottom: Some(options.margin_in),
            margin_left: Some(options.margin_in),
            margin_right: Some(options.margin_in),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        let bytes = self.page.pdf(params).await.context("printToPDF failed")?;
        Ok(bytes)
    }

    async fn current_title(&self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }
}
