use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crawler::{ChapterSource, Job, SearchSource};
use crate::download::{DownloadOptions, DownloadReport, DownloadRequest, download_chapters};
use crate::model::SearchResult;
use crate::progress::{LogBook, ProgressSink};
use crate::search::{CrawlMode, CrawlOptions, CrawlOutcome, crawl_novels};

pub type JobId = u64;

/// 后台任务发回给 [`Session`] 的消息
#[derive(Debug)]
pub enum SessionEvent {
    Log(String),
    CrawlFinished { job: JobId, outcome: CrawlOutcome },
    DownloadFinished { job: JobId, report: Result<DownloadReport> },
}

/// 把进度信息转成 [`SessionEvent::Log`] 发给会话
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    fn send(&self, event: SessionEvent) {
        // 会话已经关闭时没有接收方，直接丢弃
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, line: String) {
        debug!("{}", line);
        self.send(SessionEvent::Log(line));
    }
}

/// 持有搜索结果和日志，只通过后台任务发来的消息更新
pub struct Session<S> {
    source: Arc<S>,
    config: Config,
    results: Vec<SearchResult>,
    log: LogBook,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    next_job: JobId,
    crawl: Option<(JobId, Job<()>)>,
    download: Option<(JobId, Job<()>)>,
}

impl<S> Session<S>
where
    S: SearchSource + ChapterSource + 'static,
{
    pub fn new(source: Arc<S>, config: Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source,
            config,
            results: Vec::new(),
            log: LogBook::new(),
            tx,
            rx,
            next_job: 0,
            crawl: None,
            download: None,
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn log(&self) -> &LogBook {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub async fn export_log(&self, path: &Path) -> Result<()> {
        self.log.export(path).await
    }

    /// 列表展示用：`{序号}. {书名}`，序号从1开始
    pub fn listing(&self) -> Vec<String> {
        if self.results.is_empty() {
            return vec!["（暂无小说数据，请先爬取）".to_string()];
        }
        self.results
            .iter()
            .enumerate()
            .map(|(i, novel)| format!("{}. {}", i + 1, novel.title))
            .collect()
    }

    /// 按列表序号（从1开始）选择
    pub fn select(&self, number: usize) -> Option<&SearchResult> {
        number.checked_sub(1).and_then(|i| self.results.get(i))
    }

    pub fn is_busy(&self) -> bool {
        self.crawl.is_some() || self.download.is_some()
    }

    /// 开始新的爬取；正在进行的爬取会被取消，其结果不会写入会话
    pub fn start_crawl(&mut self, keyword: String, mode: CrawlMode) -> JobId {
        if let Some((_, job)) = self.crawl.take() {
            job.cancel();
        }

        let id = self.next_job_id();
        let source = Arc::clone(&self.source);
        let sink = self.sink();
        let options = CrawlOptions::new(mode, &self.config.delays);

        let job = Job::spawn(move |token| async move {
            let outcome = crawl_novels(source.as_ref(), &keyword, &options, &sink, &token).await;
            sink.send(SessionEvent::CrawlFinished { job: id, outcome });
        });
        self.crawl = Some((id, job));
        id
    }

    pub fn start_download(&mut self, request: DownloadRequest) -> JobId {
        if let Some((_, job)) = self.download.take() {
            job.cancel();
        }

        let id = self.next_job_id();
        let source = Arc::clone(&self.source);
        let sink = self.sink();
        let options = DownloadOptions::new(self.config.save_path.clone(), &self.config.delays);

        let job = Job::spawn(move |token| async move {
            let report = download_chapters(source.as_ref(), &request, &options, &sink, &token).await;
            if let Err(e) = &report {
                sink.emit(format!("❌ 下载失败：{}", e));
            }
            sink.send(SessionEvent::DownloadFinished { job: id, report });
        });
        self.download = Some((id, job));
        id
    }

    pub fn cancel_all(&self) {
        for (_, job) in self.crawl.iter().chain(self.download.iter()) {
            job.cancel();
        }
    }

    /// 接收下一条消息并更新会话状态
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.rx.recv().await?;
        match &event {
            SessionEvent::Log(line) => self.log.push(line.clone()),
            SessionEvent::CrawlFinished { job, outcome } => {
                let current = self.crawl.as_ref().is_some_and(|(id, _)| id == job);
                if current {
                    self.crawl = None;
                }
                if outcome.cancelled() {
                    info!("爬取任务 {} 已取消，保留原有结果", job);
                } else if !current {
                    info!("爬取任务 {} 已被新的爬取取代，忽略其结果", job);
                } else {
                    self.results = outcome.results.clone();
                }
            }
            SessionEvent::DownloadFinished { job, .. } => {
                if self.download.as_ref().is_some_and(|(id, _)| id == job) {
                    self.download = None;
                }
            }
        }
        Some(event)
    }

    /// 处理消息直到指定爬取任务结束，日志行交给 `on_log`
    pub async fn wait_crawl(
        &mut self,
        job: JobId,
        mut on_log: impl FnMut(&str),
    ) -> Option<CrawlOutcome> {
        while let Some(event) = self.next_event().await {
            match event {
                SessionEvent::Log(line) => on_log(&line),
                SessionEvent::CrawlFinished { job: id, outcome } if id == job => {
                    return Some(outcome);
                }
                _ => {}
            }
        }
        None
    }

    pub async fn wait_download(
        &mut self,
        job: JobId,
        mut on_log: impl FnMut(&str),
    ) -> Option<Result<DownloadReport>> {
        while let Some(event) = self.next_event().await {
            match event {
                SessionEvent::Log(line) => on_log(&line),
                SessionEvent::DownloadFinished { job: id, report } if id == job => {
                    return Some(report);
                }
                _ => {}
            }
        }
        None
    }

    /// 取消全部任务并等待它们退出
    pub async fn shutdown(mut self) {
        let jobs = self.crawl.take().into_iter().chain(self.download.take());
        for (id, job) in jobs {
            job.cancel();
            if let Err(e) = job.wait().await {
                warn!("任务 {} 异常退出: {}", id, e);
            }
        }
    }

    fn next_job_id(&mut self) -> JobId {
        self.next_job += 1;
        self.next_job
    }

    fn sink(&self) -> ChannelSink {
        ChannelSink {
            tx: self.tx.clone(),
        }
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        for (_, job) in self.crawl.iter().chain(self.download.iter()) {
            job.cancel();
        }
    }
}
