use std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration};

use anyhow::Result;
use scraper::Selector;
use serde::{Deserialize, Deserializer};

static DEFAULT_CONFIG_FILE: &str = "jjwxc-fetch";
static ENV_PREFIX: &str = "JJWXC_FETCH";
static DEFAULT_SAVE_DIR: &str = "小说下载";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub save_path: PathBuf,
    pub site: SiteConfig,
    pub delays: Delays,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            site: SiteConfig::default(),
            delays: Delays::default(),
        }
    }
}

impl Config {
    /// 依次读取默认值、配置文件（未指定时为可选的 `jjwxc-fetch.toml`）和环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).format(config::FileFormat::Toml),
            None => config::File::with_name(DEFAULT_CONFIG_FILE)
                .format(config::FileFormat::Toml)
                .required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("配置文件反序列化失败: {}", e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("配置反序列化失败: {}", e))
    }
}

fn default_save_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_default()
        .join(DEFAULT_SAVE_DIR)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub search_url: String,
    pub chapter_url: String,
    pub headers: BTreeMap<String, String>,
    pub search_timeout_secs: u64,
    pub chapter_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_selector")]
    pub result_selector: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub link_selector: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub content_selector: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub title_selector: Selector,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let headers = [
            (
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
            ),
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("Accept-Language", "zh-CN,zh;q=0.9"),
            ("Referer", "https://www.jjwxc.net/"),
            ("Connection", "keep-alive"),
            ("Upgrade-Insecure-Requests", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        Self {
            search_url: "https://www.jjwxc.net/search.php".to_owned(),
            chapter_url: "https://www.jjwxc.net/onebook.php".to_owned(),
            headers,
            search_timeout_secs: 30,
            chapter_timeout_secs: 10,
            result_selector: builtin_selector("h3.title"),
            link_selector: builtin_selector("a[href]"),
            content_selector: builtin_selector("div.novelbody"),
            title_selector: builtin_selector("h2"),
        }
    }
}

impl SiteConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn chapter_timeout(&self) -> Duration {
        Duration::from_secs(self.chapter_timeout_secs)
    }
}

/// 各类请求之间的固定等待时间（秒）
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub page_secs: f64,
    pub chapter_success_secs: f64,
    pub chapter_miss_secs: f64,
    pub chapter_error_secs: f64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            page_secs: 2.0,
            chapter_success_secs: 1.5,
            chapter_miss_secs: 1.0,
            chapter_error_secs: 2.0,
        }
    }
}

impl Delays {
    pub fn none() -> Self {
        Self {
            page_secs: 0.0,
            chapter_success_secs: 0.0,
            chapter_miss_secs: 0.0,
            chapter_error_secs: 0.0,
        }
    }

    pub fn page(&self) -> Duration {
        secs(self.page_secs)
    }

    pub fn chapter_success(&self) -> Duration {
        secs(self.chapter_success_secs)
    }

    pub fn chapter_miss(&self) -> Duration {
        secs(self.chapter_miss_secs)
    }

    pub fn chapter_error(&self) -> Duration {
        secs(self.chapter_error_secs)
    }
}

// 负数或 NaN 视为不等待
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn builtin_selector(css: &str) -> Selector {
    Selector::parse(css).expect("内置选择器无效")
}

fn deserialize_selector<'de, D>(deserializer: D) -> Result<Selector, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    Selector::parse(&s).map_err(|e| serde::de::Error::custom(format!("Invalid selector: {}", e)))
}
