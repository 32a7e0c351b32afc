use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::{MOBILE_HOST, PLATFORM_HOST};

static LOG_NO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"logNo=(\d+)").unwrap());
static TRAILING_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d{6,})/?$").unwrap());
static ILLEGAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const MAX_FILENAME_CHARS: usize = 180;

/// Numeric log identifier of a post; the deduplication unit of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostKey(String);

impl PostKey {
    /// Accepts an all-digit identifier as-is.
    pub fn from_digits(s: &str) -> Option<Self> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the canonical key of a post URL: the `logNo` query parameter, else a
/// trailing numeric path segment of six or more digits.
pub fn canonical_key(url: &str) -> Option<PostKey> {
    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "logNo") {
            if let Some(key) = PostKey::from_digits(&v) {
                return Some(key);
            }
        }
        let path = parsed.path();
        return TRAILING_ID_RE
            .captures(path)
            .and_then(|c| PostKey::from_digits(&c[1]));
    }

    // Not an absolute URL: scan the raw text the same way.
    if let Some(c) = LOG_NO_RE.captures(url) {
        return PostKey::from_digits(&c[1]);
    }
    let bare = url.split(['?', '#']).next().unwrap_or(url);
    TRAILING_ID_RE
        .captures(bare)
        .and_then(|c| PostKey::from_digits(&c[1]))
}

/// Blog owner id from `?blogId=` or the first path segment (`/<blogId>/<logNo>`).
pub fn blog_id_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "blogId") {
        if !v.is_empty() {
            return Some(v.into_owned());
        }
    }
    let first = parsed.path_segments()?.next()?;
    if first.is_empty() || first.contains('.') {
        None
    } else {
        Some(first.to_string())
    }
}

pub fn view_url(blog_id: &str, log_no: &str) -> String {
    format!("{}/PostView.naver?blogId={}&logNo={}", PLATFORM_HOST, blog_id, log_no)
}

/// Mobile rendering of the same post, or `None` when the URL lacks either id.
pub fn mobile_url(url: &str) -> Option<String> {
    let key = canonical_key(url)?;
    let blog_id = blog_id_of(url)?;
    Some(format!(
        "{}/PostView.naver?blogId={}&logNo={}",
        MOBILE_HOST, blog_id, key
    ))
}

/// Replace characters illegal in filenames, collapse whitespace, bound the length.
pub fn safe_filename(s: &str) -> String {
    let collapsed = WS_RE.replace_all(s, " ");
    let replaced = ILLEGAL_RE.replace_all(collapsed.trim(), "_");
    replaced.chars().take(MAX_FILENAME_CHARS).collect()
}

/// Resolve a relative link against the platform host.
pub fn join_abs(u: &str) -> String {
    if u.starts_with("http") {
        return u.to_string();
    }
    match Url::parse(PLATFORM_HOST).and_then(|base| base.join(u)) {
        Ok(joined) => joined.to_string(),
        Err(_) => u.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(u: &str) -> Option<String> {
        canonical_key(u).map(|k| k.to_string())
    }

    #[test]
    fn same_post_same_key_across_forms() {
        let forms = [
            "https://blog.naver.com/PostView.naver?blogId=alice&logNo=223456789012",
            "https://blog.naver.com/PostView.naver?logNo=223456789012&blogId=alice",
            "https://m.blog.naver.com/PostView.naver?blogId=alice&logNo=223456789012",
            "https://blog.naver.com/alice/223456789012",
            "https://m.blog.naver.com/alice/223456789012?referrerCode=0",
            "https://blog.naver.com/alice/223456789012/",
        ];
        for f in forms {
            assert_eq!(key(f).as_deref(), Some("223456789012"), "{f}");
        }
    }

    #[test]
    fn no_identifier_no_key() {
        assert_eq!(key("https://blog.naver.com/alice"), None);
        assert_eq!(key("https://blog.naver.com/alice/12345"), None);
        assert_eq!(key("https://blog.naver.com/PostView.naver?blogId=alice"), None);
        assert_eq!(key("not a url"), None);
    }

    #[test]
    fn relative_text_still_keyed() {
        assert_eq!(key("PostView.naver?blogId=a&logNo=42").as_deref(), Some("42"));
        assert_eq!(key("alice/2234567890").as_deref(), Some("2234567890"));
    }

    #[test]
    fn mobile_and_view_urls() {
        let u = "https://blog.naver.com/alice/223456789012";
        assert_eq!(
            mobile_url(u).as_deref(),
            Some("https://m.blog.naver.com/PostView.naver?blogId=alice&logNo=223456789012")
        );
        assert_eq!(
            view_url("alice", "1"),
            "https://blog.naver.com/PostView.naver?blogId=alice&logNo=1"
        );
        assert_eq!(blog_id_of("https://blog.naver.com/PostView.naver?logNo=1"), None);
    }

    #[test]
    fn filename_sanitization() {
        assert_eq!(safe_filename("a/b:c*d?  \"e\" <f>|g"), "a_b_c_d_ _e_ _f__g");
        assert_eq!(safe_filename("  spaced \t\n out  "), "spaced out");
        assert_eq!(safe_filename("tab\there\r\nline"), "tab here line");
        assert_eq!(safe_filename("bell\x07ring"), "bell_ring");
        assert_eq!(safe_filename(&"가".repeat(300)).chars().count(), 180);
    }

    #[test]
    fn join_relative() {
        assert_eq!(
            join_abs("/PostList.naver?blogId=a"),
            "https://blog.naver.com/PostList.naver?blogId=a"
        );
        assert_eq!(join_abs("https://x.y/z"), "https://x.y/z");
    }
}
