use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument};

static NOVEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"novelid=(\d+)").expect("正则表达式编译失败"));

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("正则表达式编译失败"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeywordError {
    #[error("关键词为空")]
    Empty,
    #[error("关键词包含无法用 GB2312/GBK 编码的字符")]
    Unmappable,
}

/// 把关键词编码成站点要求的 GBK 字节，再逐字节转成 `%XX`（大写十六进制）
pub fn encode_keyword(keyword: &str) -> Result<String, KeywordError> {
    if keyword.is_empty() {
        return Err(KeywordError::Empty);
    }

    let (bytes, _, unmappable) = encoding_rs::GBK.encode(keyword);
    if unmappable {
        return Err(KeywordError::Unmappable);
    }

    let mut encoded = String::with_capacity(bytes.len() * 3);
    for b in bytes.iter() {
        // 写入 String 不会失败
        let _ = write!(encoded, "%{:02X}", b);
    }
    Ok(encoded)
}

/// 从小说链接中提取 novelid，没有时返回空字符串
pub fn extract_novel_id(url: &str) -> String {
    NOVEL_ID
        .captures(url)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

/// 将 `\ / : * ? " < > |` 替换为 `_`，其余字符保持不变
pub fn safe_filename(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, "_").into_owned()
}

/// 小说目录名：在 [`safe_filename`] 基础上把开头的 `.` 也换成 `_`，`..` 不能跳出保存路径
pub fn safe_dirname(name: &str) -> String {
    let name = safe_filename(name);
    let rest = name.trim_start_matches('.');
    let dots = name.len() - rest.len();
    format!("{}{}", "_".repeat(dots), rest)
}

#[instrument]
pub fn get_user_input(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    debug!("用户输入: {}", input.trim());
    Ok(input.trim().to_owned())
}

#[instrument]
pub fn display_elapsed_time(duration: std::time::Duration) {
    let total_ms = duration.as_millis();

    if total_ms >= 60000 {
        // 超过1分钟：显示分秒
        let mins = total_ms / 60000;
        let secs = (total_ms % 60000) / 1000;
        info!("✅ 任务结束！耗时: {}分{}秒", mins, secs);
    } else if total_ms >= 1000 {
        let secs = total_ms / 1000;
        let ms_remaining = total_ms % 1000;

        if ms_remaining > 0 {
            info!("✅ 任务结束！耗时: {}秒{}毫秒", secs, ms_remaining);
        } else {
            info!("✅ 任务结束！耗时: {}秒", secs);
        }
    } else {
        info!("✅ 任务结束！耗时: {}毫秒", total_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_digits(encoded: &str) -> usize {
        encoded.chars().filter(|c| *c != '%').count()
    }

    #[test]
    fn encode_chinese_keyword() {
        // "小说" 的 GB2312 编码为 D0 A1 CB B5
        assert_eq!(encode_keyword("小说").unwrap(), "%D0%A1%CB%B5");
    }

    #[test]
    fn encode_ascii_bytes_too() {
        assert_eq!(encode_keyword("ab 1").unwrap(), "%61%62%20%31");
    }

    #[test]
    fn hex_length_is_twice_byte_length() {
        for keyword in ["小说", "穿越", "abc", "重生之我是女配", "A面B面"] {
            let (bytes, _, _) = encoding_rs::GBK.encode(keyword);
            let encoded = encode_keyword(keyword).unwrap();
            assert_eq!(hex_digits(&encoded), bytes.len() * 2);
            assert_eq!(encoded, encode_keyword(keyword).unwrap());
            assert!(
                encoded
                    .chars()
                    .all(|c| c == '%' || c.is_ascii_digit() || c.is_ascii_uppercase())
            );
        }
    }

    #[test]
    fn encode_rejects_unmappable_and_empty() {
        assert_eq!(encode_keyword("😀"), Err(KeywordError::Unmappable));
        assert_eq!(encode_keyword(""), Err(KeywordError::Empty));
    }

    #[test]
    fn novel_id_extraction() {
        assert_eq!(
            extract_novel_id("https://www.jjwxc.net/onebook.php?novelid=12345"),
            "12345"
        );
        assert_eq!(extract_novel_id("onebook.php?novelid=12345&chapterid=3"), "12345");
        assert_eq!(extract_novel_id("/onebook.php?novelid=7&x=novelid=9"), "7");
        assert_eq!(extract_novel_id("https://www.jjwxc.net/oneauthor.php?authorid=1"), "");
        assert_eq!(extract_novel_id("novelid=abc"), "");
    }

    #[test]
    fn safe_filename_replaces_reserved_only() {
        assert_eq!(safe_filename(r#"a\b/c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(safe_filename("第1章 初见（上）.-_"), "第1章 初见（上）.-_");
    }

    #[test]
    fn safe_dirname_neutralizes_leading_dots() {
        assert_eq!(safe_dirname(".."), "__");
        assert_eq!(safe_dirname("../上卷"), "___上卷");
        assert_eq!(safe_dirname(".隐藏"), "_隐藏");
        assert_eq!(safe_dirname("上卷...下卷"), "上卷...下卷");
    }
}
