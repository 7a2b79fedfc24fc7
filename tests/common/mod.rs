#![allow(dead_code)]

use std::sync::Mutex;

use jjwxc_fetch::{Chapter, ChapterSource, FetchError, SearchResult, SearchSource};

type PageFn = Box<dyn Fn(u32) -> Result<Vec<SearchResult>, FetchError> + Send + Sync>;
type ChapterFn = Box<dyn Fn(u32) -> Result<Chapter, FetchError> + Send + Sync>;

/// 按页码/章节号返回预设结果的假站点，同时记录被请求的页码和章节
pub struct FakeSite {
    pages: PageFn,
    chapters: ChapterFn,
    page_calls: Mutex<Vec<u32>>,
    chapter_calls: Mutex<Vec<(String, u32)>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self {
            pages: Box::new(|_| Ok(Vec::new())),
            chapters: Box::new(|_| Err(FetchError::MissingContent)),
            page_calls: Mutex::new(Vec::new()),
            chapter_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pages<F>(mut self, pages: F) -> Self
    where
        F: Fn(u32) -> Result<Vec<SearchResult>, FetchError> + Send + Sync + 'static,
    {
        self.pages = Box::new(pages);
        self
    }

    pub fn with_chapters<F>(mut self, chapters: F) -> Self
    where
        F: Fn(u32) -> Result<Chapter, FetchError> + Send + Sync + 'static,
    {
        self.chapters = Box::new(chapters);
        self
    }

    pub fn page_calls(&self) -> Vec<u32> {
        self.page_calls.lock().unwrap().clone()
    }

    pub fn chapter_calls(&self) -> Vec<u32> {
        self.chapter_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n)| *n)
            .collect()
    }
}

impl SearchSource for FakeSite {
    async fn search_page(
        &self,
        page: u32,
        _encoded_keyword: &str,
    ) -> Result<Vec<SearchResult>, FetchError> {
        self.page_calls.lock().unwrap().push(page);
        (self.pages)(page)
    }
}

impl ChapterSource for FakeSite {
    async fn chapter(&self, novel_id: &str, number: u32) -> Result<Chapter, FetchError> {
        self.chapter_calls
            .lock()
            .unwrap()
            .push((novel_id.to_owned(), number));
        (self.chapters)(number)
    }
}

pub fn novel(id: u32) -> SearchResult {
    SearchResult::new(
        format!("小说{}", id),
        format!("https://www.jjwxc.net/onebook.php?novelid={}", id),
    )
}

pub fn novels(ids: &[u32]) -> Vec<SearchResult> {
    ids.iter().copied().map(novel).collect()
}

pub fn chapter(number: u32) -> Chapter {
    Chapter {
        number,
        title: format!("第{}章 标题", number),
        body: format!("第{}章正文\n第二段", number),
    }
}

pub fn ids(results: &[SearchResult]) -> Vec<String> {
    results.iter().map(|r| r.id.clone()).collect()
}
