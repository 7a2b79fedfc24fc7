use anyhow::Result;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, GBK};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::SiteConfig;
use crate::error::FetchError;

/// 负责发出请求并把响应解码成文本，不做 HTML 解析
pub struct Downloader {
    client: Client,
    search_url: Url,
    chapter_url: Url,
    search_timeout: std::time::Duration,
    chapter_timeout: std::time::Duration,
}

impl Downloader {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let client = Client::builder()
            .default_headers(header_map(site))
            // 站点证书链不完整，按原行为关闭校验
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            search_url: Url::parse(&site.search_url)
                .map_err(|e| anyhow::anyhow!("搜索地址无效 {}: {}", site.search_url, e))?,
            chapter_url: Url::parse(&site.chapter_url)
                .map_err(|e| anyhow::anyhow!("章节地址无效 {}: {}", site.chapter_url, e))?,
            search_timeout: site.search_timeout(),
            chapter_timeout: site.chapter_timeout(),
        })
    }

    pub fn search_base(&self) -> &Url {
        &self.search_url
    }

    /// 关键词已经是 `%XX` 形式，直接放进查询串，避免被再次转义
    pub fn search_page_url(&self, page: u32, encoded_keyword: &str) -> Url {
        let mut query = format!("kw={}&ord=&t=1", encoded_keyword);
        if page > 1 {
            query.push_str(&format!("&p={}", page));
        }
        let mut url = self.search_url.clone();
        url.set_query(Some(&query));
        url
    }

    pub fn chapter_page_url(&self, novel_id: &str, chapter_id: u32) -> Url {
        let mut url = self.chapter_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("novelid", novel_id)
            .append_pair("chapterid", &chapter_id.to_string());
        url
    }

    #[instrument(skip(self, encoded_keyword))]
    pub async fn search_page(&self, page: u32, encoded_keyword: &str) -> Result<String, FetchError> {
        let url = self.search_page_url(page, encoded_keyword);
        debug!("请求搜索页: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.search_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let bytes = response.bytes().await?;
        let (html, _, had_errors) = GBK.decode(&bytes);
        if had_errors {
            debug!("搜索页存在无法解码的字节，已替换");
        }
        Ok(html.into_owned())
    }

    #[instrument(skip(self))]
    pub async fn chapter(&self, novel_id: &str, chapter_id: u32) -> Result<String, FetchError> {
        let url = self.chapter_page_url(novel_id, chapter_id);
        debug!("请求章节: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.chapter_timeout)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status(response.status()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await?;

        decode_chapter(&bytes, content_type.as_deref())
    }
}

fn header_map(site: &SiteConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &site.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("忽略无效请求头: {}", name),
        }
    }
    headers
}

/// Content-Type 中的 charset 优先，其次按内容猜测；解码出错时退回 GBK
pub fn decode_chapter(bytes: &[u8], content_type: Option<&str>) -> Result<String, FetchError> {
    let encoding = content_type
        .and_then(extract_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, had_errors) = encoding.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }

    debug!("使用 {} 解码失败，改用 GBK", encoding.name());
    let (text, _, had_errors) = GBK.decode(bytes);
    if had_errors {
        return Err(FetchError::Decode {
            encoding: GBK.name(),
        });
    }
    Ok(text.into_owned())
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloader() -> Downloader {
        Downloader::new(&SiteConfig::default()).unwrap()
    }

    #[test]
    fn first_page_has_no_page_param() {
        let url = downloader().search_page_url(1, "%D0%A1%CB%B5");
        assert_eq!(
            url.as_str(),
            "https://www.jjwxc.net/search.php?kw=%D0%A1%CB%B5&ord=&t=1"
        );
    }

    #[test]
    fn later_pages_carry_page_param() {
        let url = downloader().search_page_url(3, "%D0%A1");
        assert_eq!(url.query(), Some("kw=%D0%A1&ord=&t=1&p=3"));
    }

    #[test]
    fn chapter_url_params() {
        let url = downloader().chapter_page_url("12345", 7);
        assert_eq!(
            url.as_str(),
            "https://www.jjwxc.net/onebook.php?novelid=12345&chapterid=7"
        );
    }

    #[test]
    fn decode_uses_declared_charset() {
        let (bytes, _, _) = GBK.encode("第一章 初遇");
        let text = decode_chapter(&bytes, Some("text/html; charset=GBK")).unwrap();
        assert_eq!(text, "第一章 初遇");
    }

    #[test]
    fn decode_falls_back_to_gbk() {
        let (bytes, _, _) = GBK.encode("<div class=\"novelbody\">春风十里，不如你</div>");
        // 声明为 UTF-8 但实际是 GBK
        let text = decode_chapter(&bytes, Some("text/html; charset=utf-8")).unwrap();
        assert!(text.contains("春风十里"));
    }

    const GBK_CHAPTER: &str = "<html><body><h2>第一章 春风十里</h2><div class=\"novelbody\">\
        春风十里，不如你。她站在长安城的城墙上，看着远处的灯火一点点亮起来。\
        这一年的冬天格外漫长，雪落满了整条朱雀大街，行人都裹紧了衣裳匆匆走过。\
        他说等到来年春天，就带她去江南看杏花，看烟雨里的小桥流水人家。\
        </div></body></html>";

    #[test]
    fn decode_detects_encoding_without_header() {
        let (bytes, _, _) = GBK.encode(GBK_CHAPTER);
        let text = decode_chapter(&bytes, None).unwrap();
        assert_eq!(text, GBK_CHAPTER);
    }

    #[test]
    fn decode_detects_encoding_without_charset() {
        let (bytes, _, _) = GBK.encode(GBK_CHAPTER);
        let text = decode_chapter(&bytes, Some("text/html")).unwrap();
        assert_eq!(text, GBK_CHAPTER);
    }

    #[test]
    fn charset_parsing() {
        assert_eq!(
            extract_charset("text/html; Charset=\"gb2312\""),
            Some("gb2312".to_string())
        );
        assert_eq!(extract_charset("text/html"), None);
    }
}
