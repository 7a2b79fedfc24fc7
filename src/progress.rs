use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use tracing::{info, instrument};

/// 爬取/下载循环输出进度的地方，界面、命令行和测试各自实现
pub trait ProgressSink: Send + Sync {
    fn emit(&self, line: String);
}

/// 在内存中收集进度信息
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

/// 程序运行期间的全部日志，只追加，可清空、可导出
#[derive(Debug, Default, Clone)]
pub struct LogBook {
    lines: Vec<String>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn dump(&self) -> String {
        self.lines.join("\n")
    }

    #[instrument(skip_all)]
    pub async fn export(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.dump()).await?;
        info!("日志已导出到: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.emit("一".to_string());
        sink.emit("二".to_string());
        assert_eq!(sink.lines(), vec!["一", "二"]);
    }

    #[tokio::test]
    async fn log_book_export_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("export.log");

        let mut log = LogBook::new();
        log.push("开始爬取".to_string());
        log.push("爬取完成".to_string());
        log.export(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "开始爬取\n爬取完成");

        log.clear();
        assert!(log.is_empty());
    }
}
