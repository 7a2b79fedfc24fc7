/// 搜索结果中的一本小说
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub id: String, // novelid，链接中没有时为空
}

impl SearchResult {
    pub fn new(title: String, link: String) -> Self {
        let id = crate::utils::extract_novel_id(&link);
        Self { title, link, id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub number: u32,
    pub title: String,
    pub body: String,
}

impl Chapter {
    /// 章节文件名: `{章节号}_{标题}.txt`
    pub fn filename(&self) -> String {
        format!(
            "{}_{}.txt",
            self.number,
            crate::utils::safe_filename(&self.title)
        )
    }

    /// 文件内容: 标题，空行，正文
    pub fn to_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.body)
    }
}
