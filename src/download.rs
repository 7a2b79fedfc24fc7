use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::config::Delays;
use crate::crawler::task::pause;
use crate::crawler::{ChapterSource, Processor};
use crate::error::FetchError;
use crate::model::SearchResult;
use crate::progress::ProgressSink;

/// 连续失败这么多章后停止下载
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub novel_id: String,
    pub novel_name: String,
    pub start_chapter: u32,
    /// 0 表示一直下载到连续失败为止
    pub end_chapter: u32,
}

impl DownloadRequest {
    pub fn for_result(result: &SearchResult, start_chapter: u32, end_chapter: u32) -> Self {
        Self {
            novel_id: result.id.clone(),
            novel_name: result.title.clone(),
            start_chapter,
            end_chapter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub save_path: PathBuf,
    pub success_delay: Duration,
    pub miss_delay: Duration,
    pub error_delay: Duration,
}

impl DownloadOptions {
    pub fn new(save_path: PathBuf, delays: &Delays) -> Self {
        Self {
            save_path,
            success_delay: delays.chapter_success(),
            miss_delay: delays.chapter_miss(),
            error_delay: delays.chapter_error(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub total: u32,
    pub save_dir: PathBuf,
    /// 下一个将要尝试的章节号；章节号已到 `u32::MAX` 时停在该章
    pub next_chapter: u32,
    pub fail_count: u32,
    pub cancelled: bool,
}

/// 从开始章节逐章下载，失败的章节直接跳过，连续失败3次或超过结束章节时停止
#[instrument(skip_all, fields(novel_id = %request.novel_id))]
pub async fn download_chapters<S: ChapterSource>(
    source: &S,
    request: &DownloadRequest,
    options: &DownloadOptions,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<DownloadReport> {
    if request.novel_id.is_empty() {
        anyhow::bail!("小说ID为空，无法下载！");
    }

    let mut start = request.start_chapter;
    if start < 1 {
        start = 1;
        sink.emit("⚠️ 开始章节不能小于1，自动设为1".to_string());
    }

    let processor = Processor::create(&options.save_path, &request.novel_name).await?;
    let save_dir = processor.save_dir().to_path_buf();

    sink.emit(format!(
        "\n========== 开始下载《{}》 ==========",
        request.novel_name
    ));
    sink.emit(format!("保存路径：{}", save_dir.display()));
    if request.end_chapter > 0 {
        sink.emit(format!("下载范围：第{}-{}章", start, request.end_chapter));
    } else {
        sink.emit(format!("下载范围：第{}章到最后一章", start));
    }

    let mut chapter_id = start;
    let mut fail_count = 0;
    let mut total = 0;
    let mut cancelled = false;

    while fail_count < MAX_CONSECUTIVE_FAILURES {
        if request.end_chapter > 0 && chapter_id > request.end_chapter {
            break;
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = source.chapter(&request.novel_id, chapter_id) => Some(r),
        };
        let Some(fetched) = fetched else {
            cancelled = true;
            break;
        };

        let written = match fetched {
            Ok(chapter) => processor.write_chapter(&chapter).await.map(|_| chapter),
            Err(e) => Err(e),
        };

        let delay = match written {
            Ok(chapter) => {
                fail_count = 0;
                total += 1;
                sink.emit(format!(
                    "✅ 第{}章下载成功：{}",
                    chapter_id, chapter.title
                ));
                options.success_delay
            }
            Err(e) => {
                fail_count += 1;
                sink.emit(failure_line(chapter_id, &e));
                if e.is_miss() {
                    options.miss_delay
                } else {
                    warn!("第{}章下载异常: {}", chapter_id, e);
                    options.error_delay
                }
            }
        };
        let next = chapter_id.checked_add(1);
        chapter_id = next.unwrap_or(chapter_id);

        if fail_count >= MAX_CONSECUTIVE_FAILURES {
            sink.emit(format!(
                "⚠️ 连续{}章下载失败，停止下载",
                MAX_CONSECUTIVE_FAILURES
            ));
            break;
        }
        if next.is_none() {
            warn!("章节号已达上限 {}", chapter_id);
            break;
        }
        if !pause(cancel, delay).await {
            cancelled = true;
            break;
        }
    }

    if cancelled {
        sink.emit("⚠️ 下载已取消".to_string());
    }
    sink.emit("\n========== 下载完成 ==========".to_string());
    sink.emit(format!("共成功下载 {} 章", total));
    sink.emit(format!("文件保存至：{}", save_dir.display()));

    Ok(DownloadReport {
        total,
        save_dir,
        next_chapter: chapter_id,
        fail_count,
        cancelled,
    })
}

fn failure_line(chapter_id: u32, error: &FetchError) -> String {
    match error {
        FetchError::Status(status) => format!(
            "❌ 第{}章下载失败（状态码：{}）",
            chapter_id,
            status.as_u16()
        ),
        FetchError::MissingContent => format!("❌ 第{}章无内容", chapter_id),
        other => format!("❌ 第{}章下载异常：{}", chapter_id, other),
    }
}
