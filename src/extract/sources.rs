use chrono::{Datelike, NaiveDate};
use scraper::{Html, Selector};

use super::date::{normalize_date_at, parse_publish_span};

/// Meta tag names/properties that carry a publish timestamp on blog pages.
const DATE_META_KEYS: &[&str] = &[
    "article:published_time",
    "og:article:published_time",
    "og:regDate",
    "og:createdate",
    "datePublished",
    "pubdate",
    "publish-date",
    "date",
    "DC.date.issued",
];

/// JSON-LD fields searched for dates, in preference order.
const LD_DATE_FIELDS: &[&str] = &["datePublished", "dateCreated", "uploadDate"];

const DESKTOP_SPAN_SELECTORS: &[&str] = &[
    ".blog2_container .se_publishDate",
    ".se_publishDate",
    "table.post-top p.date",
    ".post_date",
];
const MOBILE_SPAN_SELECTORS: &[&str] = &[".blog_date", "p.blog_date", ".se_publishDate"];

const CLASS_HINT_SELECTOR: &str = r#"[class*="date"], [class*="publish"]"#;
const CLASS_HINT_LIMIT: usize = 12;
const BODY_SLICE_CHARS: usize = 3000;

/// Which source produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    StructuredSpan,
    DesktopMetadata,
    MobileSpan,
    MobileMetadata,
    StaticFetch,
    RawText,
}

impl DateSource {
    pub fn label(self) -> &'static str {
        match self {
            DateSource::StructuredSpan => "span",
            DateSource::DesktopMetadata => "metadata",
            DateSource::MobileSpan => "mobile-span",
            DateSource::MobileMetadata => "mobile-metadata",
            DateSource::StaticFetch => "static",
            DateSource::RawText => "raw-text",
        }
    }
}

/// A raw fragment from one source, consumed immediately by the normalizer.
#[derive(Debug, Clone)]
pub struct CandidateDateText {
    pub text: String,
    pub source: DateSource,
    pub fallback_year: Option<i32>,
    span_shaped: bool,
}

impl CandidateDateText {
    fn span(text: String, source: DateSource) -> Self {
        Self { text, source, fallback_year: None, span_shaped: true }
    }

    fn blob(text: String, source: DateSource, fallback_year: Option<i32>) -> Self {
        Self { text, source, fallback_year, span_shaped: false }
    }

    /// Normalize into `YYYY-MM-DD`. Span text goes through the dedicated parser.
    pub fn resolve(&self, today: NaiveDate) -> Option<String> {
        if self.span_shaped {
            parse_publish_span(&self.text, today)
        } else {
            normalize_date_at(&self.text, self.fallback_year, today.year())
        }
    }
}

/// One loaded page, parsed once and shared by every extractor.
pub struct PageDoc {
    pub html: Html,
    pub raw: String,
    pub today: NaiveDate,
}

impl PageDoc {
    pub fn parse(raw: &str, today: NaiveDate) -> Self {
        Self {
            html: Html::parse_document(raw),
            raw: raw.to_string(),
            today,
        }
    }

    pub fn meta_content(&self, key: &str) -> Option<String> {
        ["property", "name", "itemprop"].iter().find_map(|attr| {
            let sel = Selector::parse(&format!(r#"meta[{}="{}"]"#, attr, key)).ok()?;
            self.html
                .select(&sel)
                .filter_map(|el| el.value().attr("content"))
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty())
        })
    }

    pub fn title_text(&self) -> Option<String> {
        let sel = Selector::parse("title").unwrap();
        self.html
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Shared extractor signature: the cascade walks ordered lists of these.
pub type Extractor = fn(&PageDoc) -> Option<CandidateDateText>;

pub const DESKTOP_EXTRACTORS: &[Extractor] = &[structured_span, desktop_metadata];
pub const MOBILE_EXTRACTORS: &[Extractor] = &[mobile_span, mobile_metadata];
pub const STATIC_EXTRACTORS: &[Extractor] = &[static_span, static_metadata, raw_text];

/// Run extractors in order; the first candidate that normalizes wins.
pub fn first_date(doc: &PageDoc, extractors: &[Extractor]) -> Option<(String, DateSource)> {
    extractors.iter().find_map(|extract| {
        let candidate = extract(doc)?;
        let date = candidate.resolve(doc.today)?;
        Some((date, candidate.source))
    })
}

pub fn structured_span(doc: &PageDoc) -> Option<CandidateDateText> {
    span_text(doc, DESKTOP_SPAN_SELECTORS)
        .map(|t| CandidateDateText::span(t, DateSource::StructuredSpan))
}

pub fn desktop_metadata(doc: &PageDoc) -> Option<CandidateDateText> {
    let mut parts = metadata_parts(doc);
    parts.extend(class_hint_texts(doc));
    parts.push(body_slice(doc));
    joined(parts).map(|t| CandidateDateText::blob(t, DateSource::DesktopMetadata, None))
}

pub fn mobile_span(doc: &PageDoc) -> Option<CandidateDateText> {
    span_text(doc, MOBILE_SPAN_SELECTORS).map(|t| CandidateDateText::span(t, DateSource::MobileSpan))
}

pub fn mobile_metadata(doc: &PageDoc) -> Option<CandidateDateText> {
    let year = Some(doc.today.year());
    joined(metadata_parts(doc))
        .map(|t| CandidateDateText::blob(t, DateSource::MobileMetadata, year))
}

fn static_span(doc: &PageDoc) -> Option<CandidateDateText> {
    span_text(doc, DESKTOP_SPAN_SELECTORS)
        .or_else(|| span_text(doc, MOBILE_SPAN_SELECTORS))
        .map(|t| CandidateDateText::span(t, DateSource::StaticFetch))
}

fn static_metadata(doc: &PageDoc) -> Option<CandidateDateText> {
    let mut parts = metadata_parts(doc);
    parts.extend(class_hint_texts(doc));
    let year = Some(doc.today.year());
    joined(parts).map(|t| CandidateDateText::blob(t, DateSource::StaticFetch, year))
}

/// Whole response text, scripts included; catches compact timestamps in inline JSON.
pub fn raw_text(doc: &PageDoc) -> Option<CandidateDateText> {
    if doc.raw.trim().is_empty() {
        return None;
    }
    Some(CandidateDateText::blob(doc.raw.clone(), DateSource::RawText, None))
}

fn span_text(doc: &PageDoc, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        doc.html
            .select(&sel)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|t| !t.is_empty())
    })
}

fn metadata_parts(doc: &PageDoc) -> Vec<String> {
    let mut parts: Vec<String> = DATE_META_KEYS
        .iter()
        .filter_map(|k| doc.meta_content(k))
        .collect();

    let time_sel = Selector::parse("time[datetime]").unwrap();
    parts.extend(
        doc.html
            .select(&time_sel)
            .filter_map(|el| el.value().attr("datetime"))
            .map(str::to_string),
    );

    parts.extend(json_ld_dates(doc));
    parts
}

fn json_ld_dates(doc: &PageDoc) -> Vec<String> {
    let sel = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    let mut out = Vec::new();
    for el in doc.html.select(&sel) {
        let text = el.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            // Malformed blocks still get a chance through their raw text.
            out.push(text);
            continue;
        };
        for field in LD_DATE_FIELDS {
            collect_field(&value, field, &mut out);
        }
    }
    out
}

fn collect_field(value: &serde_json::Value, field: &str, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(s)) = map.get(field) {
                out.push(s.clone());
            }
            for v in map.values() {
                collect_field(v, field, out);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                collect_field(v, field, out);
            }
        }
        _ => {}
    }
}

fn class_hint_texts(doc: &PageDoc) -> Vec<String> {
    let sel = Selector::parse(CLASS_HINT_SELECTOR).unwrap();
    doc.html
        .select(&sel)
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|t| !t.is_empty() && t.chars().count() < 200)
        .take(CLASS_HINT_LIMIT)
        .collect()
}

fn body_slice(doc: &PageDoc) -> String {
    let sel = Selector::parse("body").unwrap();
    doc.html
        .select(&sel)
        .next()
        .map(|b| {
            b.text()
                .collect::<Vec<_>>()
                .join(" ")
                .chars()
                .take(BODY_SLICE_CHARS)
                .collect()
        })
        .unwrap_or_default()
}

fn joined(parts: Vec<String>) -> Option<String> {
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.trim().is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn doc(html: &str) -> PageDoc {
        PageDoc::parse(html, today())
    }

    fn fixture(name: &str) -> PageDoc {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        doc(&html)
    }

    #[test]
    fn desktop_span_fixture() {
        let d = fixture("desktop_post");
        let c = structured_span(&d).unwrap();
        assert_eq!(c.source, DateSource::StructuredSpan);
        assert_eq!(c.resolve(today()).as_deref(), Some("2024-03-07"));
        assert_eq!(
            first_date(&d, DESKTOP_EXTRACTORS),
            Some(("2024-03-07".to_string(), DateSource::StructuredSpan))
        );
    }

    #[test]
    fn span_outside_container_still_found() {
        let d = doc(r#"<div><span class="se_publishDate pcol2">1. 9.</span></div>"#);
        assert_eq!(
            structured_span(&d).and_then(|c| c.resolve(today())).as_deref(),
            Some("2026-01-09")
        );
    }

    #[test]
    fn metadata_fixture_without_span() {
        let d = fixture("metadata_only");
        assert!(structured_span(&d).is_none());
        assert_eq!(
            first_date(&d, DESKTOP_EXTRACTORS),
            Some(("2022-11-05".to_string(), DateSource::DesktopMetadata))
        );
    }

    #[test]
    fn meta_tag_order_wins_over_body() {
        let d = doc(
            r#"<html><head><meta property="article:published_time" content="2021-06-01T10:00:00+09:00"></head>
            <body>written 2019.01.01</body></html>"#,
        );
        let c = desktop_metadata(&d).unwrap();
        assert_eq!(c.resolve(today()).as_deref(), Some("2021-06-01"));
    }

    #[test]
    fn time_element_and_json_ld() {
        let t = doc(r#"<body><time datetime="2020-02-02T00:00">x</time></body>"#);
        assert_eq!(
            mobile_metadata(&t).and_then(|c| c.resolve(today())).as_deref(),
            Some("2020-02-02")
        );

        let ld = doc(
            r#"<script type="application/ld+json">{"@graph":[{"@type":"BlogPosting","datePublished":"2018-08-09"}]}</script>"#,
        );
        assert_eq!(
            mobile_metadata(&ld).and_then(|c| c.resolve(today())).as_deref(),
            Some("2018-08-09")
        );
    }

    #[test]
    fn yearless_metadata_takes_run_year() {
        let d = doc(r#"<head><meta property="og:createdate" content="10. 2. 14:30"></head>"#);
        assert_eq!(
            mobile_metadata(&d).and_then(|c| c.resolve(today())).as_deref(),
            Some("2026-10-02")
        );
        // Desktop metadata includes free body text, so it stays year-strict.
        assert_eq!(desktop_metadata(&d).and_then(|c| c.resolve(today())), None);
    }

    #[test]
    fn class_hint_text_is_scanned() {
        let d = doc(r#"<body><div class="post-publish-info">작성일 2017년 4월 3일</div></body>"#);
        assert_eq!(
            desktop_metadata(&d).and_then(|c| c.resolve(today())).as_deref(),
            Some("2017-04-03")
        );
    }

    #[test]
    fn mobile_fixture() {
        let d = fixture("mobile_post");
        assert_eq!(
            first_date(&d, MOBILE_EXTRACTORS),
            Some(("2023-12-24".to_string(), DateSource::MobileSpan))
        );
    }

    #[test]
    fn raw_text_finds_compact_timestamp() {
        let d = doc(r#"<script>var post = {"addDate": 20190315091500};</script>"#);
        assert!(structured_span(&d).is_none());
        assert_eq!(
            first_date(&d, STATIC_EXTRACTORS),
            Some(("2019-03-15".to_string(), DateSource::RawText))
        );
    }

    #[test]
    fn empty_page_yields_nothing() {
        let d = doc("<html><body></body></html>");
        assert_eq!(first_date(&d, DESKTOP_EXTRACTORS), None);
        assert_eq!(first_date(&d, MOBILE_EXTRACTORS), None);
    }
}
