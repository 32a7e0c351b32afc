use std::sync::LazyLock;

use regex::Regex;

use super::sources::PageDoc;

pub const PLATFORM_NAME: &str = "네이버";
pub const LOGIN_WORD: &str = "로그인";
pub const PLACEHOLDER_TITLE: &str = "post";

static PLATFORM_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[:\-]\s*네이버\s*블로그\s*$").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Open Graph title first, then the page's display title; the platform suffix is
/// stripped and whitespace collapsed. Falls back to a placeholder.
pub fn resolve_title(doc: Option<&PageDoc>, page_title: Option<&str>) -> String {
    let og = doc.and_then(|d| d.meta_content("og:title"));
    let display = page_title
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| doc.and_then(PageDoc::title_text));

    og.into_iter()
        .chain(display)
        .map(|t| clean_title(&t))
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string())
}

pub fn clean_title(raw: &str) -> String {
    let stripped = PLATFORM_SUFFIX_RE.replace(raw, "");
    WS_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Login or interstitial page rather than a post.
pub fn is_login_page(title: &str) -> bool {
    (title.contains(PLATFORM_NAME) && title.contains(LOGIN_WORD)) || title.contains(LOGIN_WORD)
}
