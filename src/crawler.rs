pub mod downloader;
pub mod parser;
pub mod processor;
pub mod task;

use std::future::Future;

use anyhow::Result;

pub use downloader::Downloader;
pub use parser::Parser;
pub use processor::Processor;
pub use task::Job;

use crate::config::SiteConfig;
use crate::error::FetchError;
use crate::model::{Chapter, SearchResult};

/// 搜索结果的单页来源
pub trait SearchSource: Send + Sync {
    /// `Ok(vec![])` 表示该页确实没有结果，请求或解码失败时返回 `Err`
    fn search_page(
        &self,
        page: u32,
        encoded_keyword: &str,
    ) -> impl Future<Output = Result<Vec<SearchResult>, FetchError>> + Send;
}

/// 单个章节的来源
pub trait ChapterSource: Send + Sync {
    fn chapter(
        &self,
        novel_id: &str,
        number: u32,
    ) -> impl Future<Output = Result<Chapter, FetchError>> + Send;
}

pub struct JjwxcCrawler {
    parser: Parser,
    downloader: Downloader,
}

impl JjwxcCrawler {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let downloader = Downloader::new(site)?;
        let parser = Parser::new(site, downloader.search_base().clone());
        Ok(Self { parser, downloader })
    }
}

impl SearchSource for JjwxcCrawler {
    async fn search_page(
        &self,
        page: u32,
        encoded_keyword: &str,
    ) -> Result<Vec<SearchResult>, FetchError> {
        let html = self.downloader.search_page(page, encoded_keyword).await?;
        Ok(self.parser.search_results(&html))
    }
}

impl ChapterSource for JjwxcCrawler {
    async fn chapter(&self, novel_id: &str, number: u32) -> Result<Chapter, FetchError> {
        let html = self.downloader.chapter(novel_id, number).await?;
        self.parser.chapter(&html, number)
    }
}
