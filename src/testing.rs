//! In-memory stand-ins for the browser and HTTP collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::http::PageFetcher;
use crate::renderer::{PdfOptions, Renderer, MAIN_FRAME_SRC_SCRIPT, OUTER_HTML_SCRIPT};

#[derive(Default)]
struct RendererState {
    pages: HashMap<String, (String, String)>,
    frames: HashMap<String, String>,
    failing_pdf: HashSet<String>,
    current: Option<String>,
    navigations: Vec<String>,
    printed: Vec<String>,
}

#[derive(Default)]
pub struct FakeRenderer {
    state: Mutex<RendererState>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, url: &str, title: &str, html: &str) {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), (title.to_string(), html.to_string()));
    }

    pub fn set_main_frame(&self, url: &str, src: &str) {
        self.state.lock().unwrap().frames.insert(url.to_string(), src.to_string());
    }

    pub fn fail_pdf_for(&self, url: &str) {
        self.state.lock().unwrap().failing_pdf.insert(url.to_string());
    }

    pub fn current_url(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn printed(&self) -> Vec<String> {
        self.state.lock().unwrap().printed.clone()
    }

    fn current_page(&self) -> Result<(String, String)> {
        let s = self.state.lock().unwrap();
        let url = s.current.clone().ok_or_else(|| anyhow!("no page loaded"))?;
        s.pages
            .get(&url)
            .cloned()
            .ok_or_else(|| anyhow!("no page at {}", url))
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.navigations.push(url.to_string());
        if !s.pages.contains_key(url) {
            s.current = None;
            return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED at {}", url));
        }
        s.current = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_any_of(&self, _selectors: &[&str], _timeout: Duration) -> Result<bool> {
        Ok(self.state.lock().unwrap().current.is_some())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        if script == OUTER_HTML_SCRIPT {
            let (_, html) = self.current_page()?;
            return Ok(serde_json::Value::String(html));
        }
        if script == MAIN_FRAME_SRC_SCRIPT {
            let s = self.state.lock().unwrap();
            let src = s.current.as_ref().and_then(|u| s.frames.get(u)).cloned();
            return Ok(src.map(serde_json::Value::String).unwrap_or_default());
        }
        Ok(serde_json::Value::Null)
    }

    async fn print_to_pdf(&self, _options: &PdfOptions) -> Result<Vec<u8>> {
        let mut s = self.state.lock().unwrap();
        let url = s.current.clone().ok_or_else(|| anyhow!("nothing to print"))?;
        if s.failing_pdf.contains(&url) {
            return Err(anyhow!("printToPDF failed for {}", url));
        }
        s.printed.push(url.clone());
        Ok(format!("%PDF-1.4 {}", url).into_bytes())
    }

    async fn current_title(&self) -> Result<String> {
        Ok(self.current_page()?.0)
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    bodies: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn add(&self, url: &str, body: &str) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.to_string());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {}", url))
    }
}
