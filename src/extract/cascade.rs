use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info};

use super::sources::{first_date, DateSource, Extractor, PageDoc};
use super::sources::{DESKTOP_EXTRACTORS, MOBILE_EXTRACTORS, STATIC_EXTRACTORS};
use crate::http::PageFetcher;
use crate::post_key::mobile_url;
use crate::renderer::{page_html, Renderer, MOBILE_READY_SELECTORS};

/// Outcome of the date cascade. `source` is `None` for the fallback-today case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateResolution {
    pub date: String,
    pub source: Option<DateSource>,
    /// The renderer was moved off the post page and must be sent back before printing.
    pub left_page: bool,
}

impl DateResolution {
    pub fn is_fallback(&self) -> bool {
        self.source.is_none()
    }
}

/// Walks the ordered date sources for one post, stopping at the first success.
pub struct DateCascade<'a, R: ?Sized, F: ?Sized> {
    renderer: &'a R,
    fetcher: &'a F,
    today: NaiveDate,
    mobile_wait: Duration,
}

impl<'a, R, F> DateCascade<'a, R, F>
where
    R: Renderer + ?Sized,
    F: PageFetcher + ?Sized,
{
    pub fn new(renderer: &'a R, fetcher: &'a F, today: NaiveDate, mobile_wait: Duration) -> Self {
        Self { renderer, fetcher, today, mobile_wait }
    }

    /// `desktop_html` is the already loaded post page.
    pub async fn resolve(&self, url: &str, desktop_html: &str) -> DateResolution {
        // 1-2. in-page span, then desktop metadata
        if let Some((date, source)) = self.scan(desktop_html, DESKTOP_EXTRACTORS) {
            return self.found(url, date, source, false);
        }

        let mobile = mobile_url(url);

        // 3. alternate mobile rendering
        let mut left_page = false;
        if let Some(m) = &mobile {
            left_page = true;
            match self.render_mobile(m).await {
                Ok(Some((date, source))) => return self.found(url, date, source, left_page),
                Ok(None) => debug!("No date in mobile rendering of {}", url),
                Err(e) => debug!("Mobile rendering failed for {}: {}", m, e),
            }
        }

        // 4. static fetch: desktop URL, then mobile URL
        let targets = std::iter::once(url.to_string()).chain(mobile);
        for target in targets {
            match self.fetcher.fetch_text(&target).await {
                Ok(body) => {
                    if let Some((date, source)) = self.scan(&body, STATIC_EXTRACTORS) {
                        return self.found(url, date, source, left_page);
                    }
                }
                Err(e) => debug!("Static fetch failed for {}: {}", target, e),
            }
        }

        // 5. today, flagged as an upload date
        let date = self.today.format("%Y-%m-%d").to_string();
        info!("No publish date for {}; using today ({})", url, date);
        DateResolution { date, source: None, left_page }
    }

    async fn render_mobile(&self, mobile: &str) -> anyhow::Result<Option<(String, DateSource)>> {
        self.renderer.navigate(mobile).await?;
        self.renderer
            .wait_for_any_of(MOBILE_READY_SELECTORS, self.mobile_wait)
            .await?;
        let html = page_html(self.renderer).await;
        Ok(self.scan(&html, MOBILE_EXTRACTORS))
    }

    fn scan(&self, html: &str, extractors: &[Extractor]) -> Option<(String, DateSource)> {
        if html.trim().is_empty() {
            return None;
        }
        let doc = PageDoc::parse(html, self.today);
        first_date(&doc, extractors)
    }

    fn found(&self, url: &str, date: String, source: DateSource, left_page: bool) -> DateResolution {
        debug!("Date {} for {} via {}", date, url, source.label());
        DateResolution { date, source: Some(source), left_page }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFetcher, FakeRenderer};

    const DESKTOP: &str = "https://blog.naver.com/PostView.naver?blogId=alice&logNo=223456789012";
    const MOBILE: &str = "https://m.blog.naver.com/PostView.naver?blogId=alice&logNo=223456789012";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn cascade<'a>(r: &'a FakeRenderer, f: &'a FakeFetcher) -> DateCascade<'a, FakeRenderer, FakeFetcher> {
        DateCascade::new(r, f, today(), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn desktop_span_short_circuits() {
        let (r, f) = (FakeRenderer::new(), FakeFetcher::default());
        let res = cascade(&r, &f).resolve(DESKTOP, &fixture("desktop_post")).await;
        assert_eq!(res.date, "2024-03-07");
        assert_eq!(res.source, Some(DateSource::StructuredSpan));
        assert!(!res.left_page);
        assert!(r.navigations().is_empty());
        assert!(f.requests().is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_mobile_rendering() {
        let (r, f) = (FakeRenderer::new(), FakeFetcher::default());
        r.add_page(MOBILE, "모바일", &fixture("mobile_post"));
        let res = cascade(&r, &f).resolve(DESKTOP, "<html><body>본문</body></html>").await;
        assert_eq!(res.date, "2023-12-24");
        assert_eq!(res.source, Some(DateSource::MobileSpan));
        assert!(res.left_page);
        assert_eq!(r.navigations(), vec![MOBILE.to_string()]);
        assert!(f.requests().is_empty());
    }

    #[tokio::test]
    async fn yearless_mobile_metadata_resolves() {
        let (r, f) = (FakeRenderer::new(), FakeFetcher::default());
        r.add_page(
            MOBILE,
            "모바일",
            r#"<html><head><meta property="og:createdate" content="10. 2. 14:30"></head><body></body></html>"#,
        );
        let res = cascade(&r, &f).resolve(DESKTOP, "<html><body>본문</body></html>").await;
        assert_eq!(res.date, "2026-10-02");
        assert_eq!(res.source, Some(DateSource::MobileMetadata));
        assert!(f.requests().is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_static_fetch() {
        let (r, f) = (FakeRenderer::new(), FakeFetcher::default());
        r.add_page(MOBILE, "모바일", "<html><body></body></html>");
        f.add(MOBILE, r#"<script>{"addDate":"20200707120000"}</script>"#);
        let res = cascade(&r, &f).resolve(DESKTOP, "<html><body></body></html>").await;
        assert_eq!(res.date, "2020-07-07");
        assert_eq!(res.source, Some(DateSource::RawText));
        assert_eq!(f.requests(), vec![DESKTOP.to_string(), MOBILE.to_string()]);
    }

    #[tokio::test]
    async fn everything_fails_uses_today() {
        let (r, f) = (FakeRenderer::new(), FakeFetcher::default());
        let res = cascade(&r, &f).resolve(DESKTOP, "").await;
        assert_eq!(res.date, "2026-10-18");
        assert!(res.is_fallback());
        assert!(res.left_page);
    }

    #[tokio::test]
    async fn keyless_url_skips_mobile() {
        let (r, f) = (FakeRenderer::new(), FakeFetcher::default());
        let url = "https://example.com/some/post";
        let res = cascade(&r, &f).resolve(url, "<html></html>").await;
        assert!(res.is_fallback());
        assert!(!res.left_page);
        assert!(r.navigations().is_empty());
        assert_eq!(f.requests(), vec![url.to_string()]);
    }
}
