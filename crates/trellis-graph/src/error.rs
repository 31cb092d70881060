use thiserror::Error;

/// Fatal outcome of a crawl. The graph gathered so far stays usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlError {
    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Crawl deadline exceeded")]
    DeadlineExceeded,
}
