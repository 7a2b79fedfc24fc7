pub mod cli;
pub mod config;
pub mod crawler;
pub mod download;
pub mod error;
pub mod logger;
pub mod model;
pub mod progress;
pub mod search;
pub mod session;
pub mod utils;

pub use config::Config;
pub use crawler::{ChapterSource, JjwxcCrawler, SearchSource};
pub use download::{DownloadOptions, DownloadReport, DownloadRequest, download_chapters};
pub use error::FetchError;
pub use model::{Chapter, SearchResult};
pub use progress::{LogBook, MemorySink, ProgressSink};
pub use search::{CrawlMode, CrawlOptions, CrawlOutcome, CrawlStop, PageFailurePolicy, crawl_novels};
pub use session::{Session, SessionEvent};
