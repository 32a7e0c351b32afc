use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::extract::sources::PageDoc;
use crate::extract::{is_login_page, resolve_title, DateCascade};
use crate::http::PageFetcher;
use crate::ledger::{Ledger, PostRecord, PublishDate};
use crate::listing::{enumerate_category, CategoryRef, EnumerateOptions, ListingSource};
use crate::post_key::{canonical_key, safe_filename, PostKey};
use crate::renderer::{enter_main_frame, page_html, PdfOptions, Renderer, POST_READY_SELECTORS};

/// State scoped to one run: ledger keys and the enumerator's seen identifiers.
#[derive(Debug, Default)]
pub struct RunContext {
    pub done: HashSet<PostKey>,
    pub seen_ids: HashSet<String>,
}

impl RunContext {
    pub fn from_ledger(ledger: &Ledger) -> Result<Self> {
        let done = ledger.load()?;
        info!("Ledger {} holds {} processed posts", ledger.path().display(), done.len());
        Ok(Self { done, seen_ids: HashSet::new() })
    }
}

pub enum PostOutcome {
    Saved(PostRecord),
    LoginPage,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub candidates: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fallback_dates: usize,
}

impl RunStats {
    pub fn print(&self) {
        println!(
            "Saved {} of {} posts ({} skipped, {} failed, {} with upload-date fallback).",
            self.saved, self.candidates, self.skipped, self.failed, self.fallback_dates,
        );
    }
}

/// Sequences filtering, render, extraction, output, and ledger append.
pub struct Pipeline<'a, R: ?Sized, F: ?Sized> {
    renderer: &'a R,
    fetcher: &'a F,
    ledger: &'a Ledger,
    config: &'a RunConfig,
    today: NaiveDate,
}

impl<'a, R, F> Pipeline<'a, R, F>
where
    R: Renderer + ?Sized,
    F: PageFetcher + ?Sized,
{
    pub fn new(renderer: &'a R, fetcher: &'a F, ledger: &'a Ledger, config: &'a RunConfig) -> Self {
        Self {
            renderer,
            fetcher,
            ledger,
            config,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Category mode: enumerate, dump the full list, then process what is new.
    pub async fn run_category<S: ListingSource + ?Sized>(
        &self,
        ctx: &mut RunContext,
        source: &S,
        category: &CategoryRef,
        label: &str,
    ) -> Result<RunStats> {
        let opts = EnumerateOptions {
            page_size: self.config.page_size,
            ..Default::default()
        };
        let urls = enumerate_category(source, category, &opts, &mut ctx.seen_ids).await?;
        println!("Collected {} posts from category {}", urls.len(), category.category_no);

        let dump = self.config.out_dir.join(format!(
            "collected_{}_{}_ALL.txt",
            safe_filename(label),
            category.category_no
        ));
        fs::write(&dump, urls.join("\n"))
            .with_context(|| format!("Failed to write {}", dump.display()))?;
        debug!("Wrote URL dump {}", dump.display());

        self.process_urls(ctx, urls).await
    }

    /// Process a literal URL list in order. A failing post never aborts the run.
    pub async fn process_urls(&self, ctx: &mut RunContext, urls: Vec<String>) -> Result<RunStats> {
        let input = urls.len();
        let pending = pending_urls(urls, &ctx.done);
        println!("{} candidate URLs, {} left after dedupe and ledger filter", input, pending.len());

        let mut stats = RunStats { candidates: pending.len(), ..Default::default() };
        let total = pending.len();
        let pb = progress_bar(total);

        for (i, url) in pending.iter().enumerate() {
            let n = i + 1;
            match self.process_one(url).await {
                Ok(PostOutcome::Saved(record)) => match self.ledger.append(&record) {
                    Ok(()) => {
                        stats.saved += 1;
                        if record.publish_date.fallback {
                            stats.fallback_dates += 1;
                        }
                        report(&pb, format!("[{}/{}] Saved: {}", n, total, record.output_filename));
                        if let Some(key) = record.key {
                            ctx.done.insert(key);
                        }
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!("Ledger append failed for {}: {:#}", url, e);
                        report(&pb, format!("[WARN] not recorded: {} -> {:#}", url, e));
                    }
                },
                Ok(PostOutcome::LoginPage) => {
                    stats.skipped += 1;
                    report(&pb, format!("[{}/{}] Skipped (login page): {}", n, total, url));
                }
                Err(e) => {
                    stats.failed += 1;
                    report(&pb, format!("[WARN] failed: {} -> {:#}", url, e));
                }
            }
            pb.inc(1);
            self.config.throttle.sleep().await;
        }

        pb.finish_and_clear();
        info!(
            "Run finished: {} saved, {} skipped, {} failed",
            stats.saved, stats.skipped, stats.failed
        );
        Ok(stats)
    }

    /// Render one post to PDF. Writes the output file but not the ledger row.
    pub async fn process_one(&self, url: &str) -> Result<PostOutcome> {
        self.renderer.navigate(url).await?;
        if let Err(e) = enter_main_frame(self.renderer, url).await {
            debug!("Main frame lookup failed for {}: {}", url, e);
        }
        if !self
            .renderer
            .wait_for_any_of(POST_READY_SELECTORS, self.config.wait_timeout)
            .await
            .unwrap_or(false)
        {
            debug!("Page-ready wait timed out for {}; continuing", url);
        }

        let html = page_html(self.renderer).await;
        let page_title = self.renderer.current_title().await.ok();
        let title = {
            let doc = (!html.trim().is_empty()).then(|| PageDoc::parse(&html, self.today));
            resolve_title(doc.as_ref(), page_title.as_deref())
        };
        if is_login_page(&title) || page_title.as_deref().is_some_and(is_login_page) {
            return Ok(PostOutcome::LoginPage);
        }

        let cascade = DateCascade::new(
            self.renderer,
            self.fetcher,
            self.today,
            self.config.mobile_wait_timeout,
        );
        let resolution = cascade.resolve(url, &html).await;
        if resolution.left_page {
            self.renderer.navigate(url).await?;
            let _ = enter_main_frame(self.renderer, url).await;
            let _ = self
                .renderer
                .wait_for_any_of(POST_READY_SELECTORS, self.config.wait_timeout)
                .await;
        }

        let key = canonical_key(url);
        let publish_date = if resolution.is_fallback() {
            PublishDate::upload(resolution.date)
        } else {
            PublishDate::extracted(resolution.date)
        };

        let pdf = self.renderer.print_to_pdf(&PdfOptions::default()).await?;
        let path = output_path(&self.config.out_dir, &publish_date.date, &title, key.as_ref());
        write_atomic(&path, &pdf)?;

        let output_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(PostOutcome::Saved(PostRecord {
            key,
            publish_date,
            title,
            output_filename,
            source_url: url.to_string(),
        }))
    }
}

/// Drop within-run duplicates by canonical key, then keys already in the ledger.
/// URLs without a key are always kept.
pub fn pending_urls(urls: Vec<String>, done: &HashSet<PostKey>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| match canonical_key(u) {
            Some(k) => !done.contains(&k) && seen.insert(k),
            None => true,
        })
        .collect()
}

/// `<date>_<title>.pdf`, or `<date>_<title>_<key>.pdf` when the base name is taken.
pub fn output_path(out_dir: &Path, date: &str, title: &str, key: Option<&PostKey>) -> PathBuf {
    let base = safe_filename(&format!("{}_{}", date, title));
    let first = out_dir.join(format!("{}.pdf", base));
    if !first.exists() {
        return first;
    }

    let tag = key.map(PostKey::to_string).unwrap_or_else(|| "dup".to_string());
    let keyed = out_dir.join(format!("{}_{}.pdf", base, tag));
    if !keyed.exists() {
        return keyed;
    }
    (2..)
        .map(|n| out_dir.join(format!("{}_{}_{}.pdf", base, tag, n)))
        .find(|p| !p.exists())
        .unwrap_or(keyed)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to move PDF into {}", path.display()))?;
    Ok(())
}

/// Progress lines go around the bar so they survive when the bar is hidden.
fn report(pb: &ProgressBar, line: String) {
    pb.suspend(|| println!("{}", line));
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// One URL per line; blank lines ignored.
pub fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL file {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
