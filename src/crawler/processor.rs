use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::FetchError;
use crate::model::Chapter;
use crate::utils::safe_dirname;

/// 把章节写成 `<保存路径>/<小说名>/<章节号>_<标题>.txt`
#[derive(Clone)]
pub struct Processor {
    save_dir: PathBuf,
}

impl Processor {
    pub async fn create(save_root: &Path, novel_name: &str) -> Result<Self> {
        let save_dir = save_root.join(safe_dirname(novel_name));
        fs::create_dir_all(&save_dir)
            .await
            .map_err(|e| anyhow::anyhow!("无法创建目录 {}: {}", save_dir.display(), e))?;
        Ok(Self { save_dir })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    #[instrument(skip_all, fields(chapter = chapter.number))]
    pub async fn write_chapter(&self, chapter: &Chapter) -> Result<PathBuf, FetchError> {
        let path = self.save_dir.join(chapter.filename());
        fs::write(&path, chapter.to_text()).await?;
        debug!("章节已保存到: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_sanitized_novel_dir() {
        let root = tempfile::tempdir().unwrap();
        let processor = Processor::create(root.path(), "上卷:下卷").await.unwrap();
        assert_eq!(processor.save_dir(), root.path().join("上卷_下卷"));

        let chapter = Chapter {
            number: 3,
            title: "他说：\"你好\"".to_string(),
            body: "内容".to_string(),
        };
        let path = processor.write_chapter(&chapter).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "3_他说：_你好_.txt");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "他说：\"你好\"\n\n内容");
    }

    #[tokio::test]
    async fn dot_names_stay_inside_save_root() {
        let root = tempfile::tempdir().unwrap();
        let save_root = root.path().join("小说下载");
        let processor = Processor::create(&save_root, "..").await.unwrap();
        assert_eq!(processor.save_dir(), save_root.join("__"));
        assert!(processor.save_dir().starts_with(&save_root));
        assert!(processor.save_dir().is_dir());
    }
}
