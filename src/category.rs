use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::info;

use crate::config::PLATFORM_HOST;
use crate::error::ArchiveError;
use crate::listing::CategoryRef;
use crate::post_key::join_abs;
use crate::renderer::{enter_main_frame, page_html, Renderer};

static CATEGORY_NO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"categoryNo\s*=?\s*['"]?(\d+)"#).unwrap());
static CHANGE_CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"changeCategory\(\s*(\d+)\s*\)").unwrap());

const CANDIDATE_SELECTOR: &str = "a, li, span, div, button";
const DATA_ATTRS: &[&str] = &["data-category-no", "data-categoryno", "data-cate-no"];

/// One entry of the blog's category navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub name: String,
    pub href: String,
    pub category_no: String,
}

/// Find every element whose link, click handler or data attributes name a category.
pub fn parse_categories(html: &str, blog_id: &str) -> Vec<CategoryLink> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(CANDIDATE_SELECTOR).unwrap();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for el in doc.select(&sel) {
        let v = el.value();
        let attr = |name: &str| v.attr(name).unwrap_or("");
        let href = v.attr("href").or_else(|| v.attr("data-url")).unwrap_or("");
        let data_cat = DATA_ATTRS.iter().map(|&a| attr(a)).find(|s| !s.is_empty()).unwrap_or("");

        let blob = format!("{} {} {} {}", href, attr("onclick"), data_cat, attr("data-parameter"));
        let category_no = CATEGORY_NO_RE
            .captures(&blob)
            .or_else(|| CHANGE_CATEGORY_RE.captures(&blob))
            .map(|c| c[1].to_string())
            .or_else(|| data_cat.chars().all(|c| c.is_ascii_digit()).then(|| data_cat.to_string()))
            .filter(|n| !n.is_empty());
        let Some(category_no) = category_no else {
            continue;
        };

        let text = el.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let name = [text.as_str(), attr("title"), attr("aria-label")]
            .into_iter()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("cat_{}", category_no));

        if !seen.insert((name.clone(), category_no.clone())) {
            continue;
        }
        let href = if href.is_empty() || href.starts_with('#') {
            format!(
                "{}/PostList.naver?blogId={}&from=postList&categoryNo={}",
                PLATFORM_HOST, blog_id, category_no
            )
        } else {
            join_abs(href)
        };
        out.push(CategoryLink { name, href, category_no });
    }
    out
}

/// Exact label match first, then the first label containing the key.
pub fn match_category<'a>(cats: &'a [CategoryLink], key: &str) -> Option<&'a CategoryLink> {
    cats.iter()
        .find(|c| c.name == key)
        .or_else(|| cats.iter().find(|c| c.name.contains(key)))
}

/// Resolve a category label by rendering the blog home and scanning its navigation.
pub async fn resolve_category<R: Renderer + ?Sized>(
    renderer: &R,
    blog_id: &str,
    label: &str,
    wait: Duration,
) -> Result<CategoryRef> {
    let home = format!("{}/{}", PLATFORM_HOST, blog_id);
    renderer.navigate(&home).await?;
    enter_main_frame(renderer, &home).await?;
    renderer.wait_for_any_of(&["body"], wait).await?;

    let html = page_html(renderer).await;
    let cats = parse_categories(&html, blog_id);
    let found = match_category(&cats, label).ok_or_else(|| ArchiveError::CategoryNotFound {
        blog_id: blog_id.to_string(),
        label: label.to_string(),
    })?;

    info!("Category '{}' -> categoryNo={}", label, found.category_no);
    Ok(CategoryRef {
        blog_id: blog_id.to_string(),
        category_no: found.category_no.clone(),
    })
}
