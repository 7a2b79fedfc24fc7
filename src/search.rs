use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::Delays;
use crate::crawler::SearchSource;
use crate::crawler::task::pause;
use crate::model::SearchResult;
use crate::progress::ProgressSink;
use crate::utils::encode_keyword;

/// 无论哪种模式，最多爬取的页数
pub const PAGE_CAP: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// 最多保留 `max` 条结果，连续2页为空时停止
    Bounded { max: usize },
    /// 一直爬到连续3页为空
    UntilFail,
}

impl CrawlMode {
    pub fn empty_page_limit(&self) -> u32 {
        match self {
            CrawlMode::Bounded { .. } => 2,
            CrawlMode::UntilFail => 3,
        }
    }

    fn max(&self) -> Option<usize> {
        match self {
            CrawlMode::Bounded { max } => Some(*max),
            CrawlMode::UntilFail => None,
        }
    }
}

/// 搜索页请求失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFailurePolicy {
    /// 与空页相同，计入连续空页
    #[default]
    CountAsEmpty,
    /// 立即结束爬取
    Abort,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub mode: CrawlMode,
    pub on_page_failure: PageFailurePolicy,
    pub page_delay: Duration,
}

impl CrawlOptions {
    pub fn new(mode: CrawlMode, delays: &Delays) -> Self {
        Self {
            mode,
            on_page_failure: PageFailurePolicy::default(),
            page_delay: delays.page(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStop {
    PageCap,
    EmptyStreak,
    LimitReached,
    PageFailed,
    InvalidKeyword,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub results: Vec<SearchResult>,
    pub pages_fetched: u32,
    pub stop: CrawlStop,
}

impl CrawlOutcome {
    pub fn cancelled(&self) -> bool {
        self.stop == CrawlStop::Cancelled
    }
}

/// 按页爬取搜索结果，按链接去重，直到达到数量上限、连续空页或50页
#[instrument(skip_all, fields(keyword = %keyword))]
pub async fn crawl_novels<S: SearchSource>(
    source: &S,
    keyword: &str,
    options: &CrawlOptions,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> CrawlOutcome {
    let encoded = match encode_keyword(keyword) {
        Ok(encoded) => encoded,
        Err(e) => {
            sink.emit(format!("❌ 关键词「{}」编码失败：{}", keyword, e));
            return CrawlOutcome {
                results: Vec::new(),
                pages_fetched: 0,
                stop: CrawlStop::InvalidKeyword,
            };
        }
    };

    let empty_limit = options.mode.empty_page_limit();
    sink.emit(format!("开始爬取关键词「{}」的小说数据...", keyword));
    match options.mode {
        CrawlMode::UntilFail => {
            sink.emit(format!("爬取模式：爬取直到连续{}页为空", empty_limit));
        }
        CrawlMode::Bounded { max } => {
            sink.emit(format!(
                "爬取模式：最多{}条（连续{}页空则终止）",
                max, empty_limit
            ));
        }
    }

    let mut results: Vec<SearchResult> = Vec::new();
    let mut seen = HashSet::new();
    let mut page = 1;
    let mut empty_streak = 0;
    let mut pages_fetched = 0;

    let stop = loop {
        if options.mode.max() == Some(0) {
            break CrawlStop::LimitReached;
        }
        if page > PAGE_CAP {
            sink.emit(format!("⚠️ 已爬取{}页，强制终止", PAGE_CAP));
            break CrawlStop::PageCap;
        }

        sink.emit(format!(
            "正在爬取第{}页...（当前已获取{}条）",
            page,
            results.len()
        ));

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = source.search_page(page, &encoded) => Some(r),
        };
        let Some(fetched) = fetched else {
            break CrawlStop::Cancelled;
        };
        pages_fetched += 1;

        let entries = match fetched {
            Ok(entries) => entries,
            Err(e) => {
                sink.emit(format!("❌ 第{}页请求失败：{}", page, e));
                if options.on_page_failure == PageFailurePolicy::Abort {
                    break CrawlStop::PageFailed;
                }
                Vec::new()
            }
        };
        debug!(page, entries = entries.len(), "搜索页解析完成");

        if entries.is_empty() {
            empty_streak += 1;
            sink.emit(format!(
                "❌ 第{}页无数据（连续空页{}次）",
                page, empty_streak
            ));
            if empty_streak >= empty_limit {
                sink.emit(format!("⚠️ 连续{}页为空，终止爬取", empty_limit));
                break CrawlStop::EmptyStreak;
            }
        } else {
            empty_streak = 0;
            let mut new_count = 0;
            let mut limit_reached = false;

            for entry in entries {
                if seen.contains(&entry.link) {
                    continue;
                }
                seen.insert(entry.link.clone());
                results.push(entry);
                new_count += 1;

                if options.mode.max().is_some_and(|max| results.len() >= max) {
                    limit_reached = true;
                    break;
                }
            }

            sink.emit(format!(
                "✅ 第{}页爬取完成，新增{}条（累计{}条）",
                page,
                new_count,
                results.len()
            ));

            if limit_reached {
                sink.emit(format!("✅ 已获取{}条数据，达到数量限制", results.len()));
                break CrawlStop::LimitReached;
            }
        }

        sink.emit(format!(
            "等待{}秒后继续...",
            options.page_delay.as_secs_f64()
        ));
        if !pause(cancel, options.page_delay).await {
            break CrawlStop::Cancelled;
        }
        page += 1;
    };

    if stop == CrawlStop::Cancelled {
        sink.emit("⚠️ 爬取已取消".to_string());
    }
    sink.emit("\n========== 爬取完成 ==========".to_string());
    sink.emit(format!("最终获取到 {} 本小说", results.len()));

    CrawlOutcome {
        results,
        pages_fetched,
        stop,
    }
}
