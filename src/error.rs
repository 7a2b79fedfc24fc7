use reqwest::StatusCode;
use thiserror::Error;

/// 单次请求（搜索页或章节）可能出现的失败
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("网络请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("状态码异常: {0}")]
    Status(StatusCode),

    #[error("页面中没有正文内容")]
    MissingContent,

    #[error("无法使用 {encoding} 解码页面")]
    Decode { encoding: &'static str },

    #[error("文件写入失败: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// 站点正常响应但没有可用内容（状态码或缺少正文），
    /// 与网络、解码、写入等异常区分开，两者等待时间不同
    pub fn is_miss(&self) -> bool {
        matches!(self, FetchError::Status(_) | FetchError::MissingContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_kinds() {
        assert!(FetchError::Status(StatusCode::NOT_FOUND).is_miss());
        assert!(FetchError::MissingContent.is_miss());
        assert!(!FetchError::Decode { encoding: "GBK" }.is_miss());
        assert!(!FetchError::Io(std::io::Error::other("disk full")).is_miss());
    }
}
