use thiserror::Error;

/// Failures that abort a whole run. Per-post failures never reach this type.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("category '{label}' not found in the navigation of blog '{blog_id}'")]
    CategoryNotFound { blog_id: String, label: String },

    #[error("listing page {page} could not be decoded after a retry: {source}")]
    ListingDecode {
        page: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error("--blog-id is required when --urls-file is not given")]
    MissingBlogId,
}
