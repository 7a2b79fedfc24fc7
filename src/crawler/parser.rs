use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::config::SiteConfig;
use crate::error::FetchError;
use crate::model::{Chapter, SearchResult};

#[derive(Clone)]
pub struct Parser {
    base: Url,
    result_selector: Selector,
    link_selector: Selector,
    content_selector: Selector,
    title_selector: Selector,
}

impl Parser {
    /// `base` 用于把搜索结果中的相对链接补全
    pub fn new(site: &SiteConfig, base: Url) -> Self {
        Self {
            base,
            result_selector: site.result_selector.clone(),
            link_selector: site.link_selector.clone(),
            content_selector: site.content_selector.clone(),
            title_selector: site.title_selector.clone(),
        }
    }

    #[instrument(skip_all)]
    pub fn search_results(&self, html: &str) -> Vec<SearchResult> {
        let document = Html::parse_document(html);
        let mut results = Vec::new();

        for entry in document.select(&self.result_selector) {
            let Some(anchor) = entry.select(&self.link_selector).next() else {
                continue;
            };
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };

            let href = href.trim();
            let link = if href.starts_with("http") {
                href.to_owned()
            } else {
                match self.base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(e) => {
                        debug!("无法补全链接 {}: {}", href, e);
                        continue;
                    }
                }
            };

            results.push(SearchResult::new(stripped_text(anchor), link));
        }

        debug!("解析到 {} 条搜索结果", results.len());
        results
    }

    #[instrument(skip(self, html))]
    pub fn chapter(&self, html: &str, number: u32) -> Result<Chapter, FetchError> {
        let document = Html::parse_document(html);

        let content = document
            .select(&self.content_selector)
            .next()
            .ok_or(FetchError::MissingContent)?;

        let title = document
            .select(&self.title_selector)
            .next()
            .map(stripped_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("第{}章", number));

        let body = content
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Chapter {
            number,
            title,
            body,
        })
    }
}

// 每个文本节点去掉首尾空白后直接拼接
fn stripped_text(element: ElementRef) -> String {
    element.text().map(str::trim).collect()
}
