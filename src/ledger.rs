use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::post_key::{canonical_key, PostKey};

const HEADER: &str = "# postKey\tdate\ttitle\toutputFilename\tsourceUrl";
const UPLOAD_PREFIX: &str = "upload:";

/// Publish date of a record; `fallback` marks a synthesized upload date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishDate {
    pub date: String,
    pub fallback: bool,
}

impl PublishDate {
    pub fn extracted(date: impl Into<String>) -> Self {
        Self { date: date.into(), fallback: false }
    }

    pub fn upload(date: impl Into<String>) -> Self {
        Self { date: date.into(), fallback: true }
    }

    fn to_field(&self) -> String {
        if self.fallback {
            format!("{}{}", UPLOAD_PREFIX, self.date)
        } else {
            self.date.clone()
        }
    }

    fn from_field(field: &str) -> Self {
        match field.strip_prefix(UPLOAD_PREFIX) {
            Some(d) => Self::upload(d),
            None => Self::extracted(field),
        }
    }
}

/// One fully processed post. Written once, never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub key: Option<PostKey>,
    pub publish_date: PublishDate,
    pub title: String,
    pub output_filename: String,
    pub source_url: String,
}

impl PostRecord {
    fn to_line(&self) -> String {
        let key = self.key.as_ref().map(PostKey::as_str).unwrap_or("");
        [
            key.to_string(),
            self.publish_date.to_field(),
            self.title.clone(),
            self.output_filename.clone(),
            self.source_url.clone(),
        ]
        .iter()
        .map(|f| clean_field(f))
        .collect::<Vec<_>>()
        .join("\t")
    }
}

/// Append-only TSV journal of processed posts; the resumption source of truth.
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys already done. A missing file is an empty ledger.
    pub fn load(&self) -> Result<HashSet<PostKey>> {
        Ok(self.read_lines()?.iter().filter_map(|l| line_key(l)).collect())
    }

    /// Full rows, for status reporting. Legacy rows carry only a key.
    pub fn records(&self) -> Result<Vec<PostRecord>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|l| parse_record(l))
            .collect())
    }

    /// Add one row. The line is written with a single call in append mode.
    pub fn append(&self, record: &PostRecord) -> Result<()> {
        let is_new = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;

        let mut buf = String::new();
        if is_new {
            buf.push_str(HEADER);
            buf.push('\n');
        }
        buf.push_str(&record.to_line());
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ledger {}", self.path.display()))?;
        Ok(text
            .lines()
            .filter(|l| {
                let t = l.trim();
                !t.is_empty() && !t.starts_with('#')
            })
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect())
    }
}

/// First column is a bare key; older journals hold a URL there instead.
fn line_key(line: &str) -> Option<PostKey> {
    let first = line.split('\t').next()?.trim();
    PostKey::from_digits(first).or_else(|| canonical_key(first))
}

/// Rows written without a key still come back; a bare line needs one.
fn parse_record(line: &str) -> Option<PostRecord> {
    let key = line_key(line);
    if key.is_none() && !line.contains('\t') {
        return None;
    }
    let mut fields = line.split('\t').skip(1);
    let mut next = || fields.next().unwrap_or("").to_string();
    let date = next();
    let title = next();
    let output_filename = next();
    let mut source_url = next();
    if source_url.is_empty() && !line.contains('\t') {
        source_url = line.to_string();
    }
    Some(PostRecord {
        key,
        publish_date: PublishDate::from_field(&date),
        title,
        output_filename,
        source_url,
    })
}

fn clean_field(s: &str) -> String {
    s.replace(['\t', '\r', '\n'], " ")
}
