//! 文字處理小工具：價格解析、標題清理、URL slug 還原、憑證清理

use regex::Regex;
use std::sync::LazyLock;

static BARE_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d,.\s€$£]+$").expect("bare price pattern"));

static PRICE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("price token pattern"));

static NUMERIC_OR_CURRENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*|[€$£]").expect("numeric strip pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

static ITEM_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/items/(\d+)-([^/?#]+)").expect("item slug pattern"));

pub const MAX_TITLE_CHARS: usize = 200;

/// 是否只是一個價格字串，例如 "12,50 €"
pub fn is_bare_price(text: &str) -> bool {
    BARE_PRICE.is_match(text)
}

/// 取出第一個數字 token 並轉成價格，無法解析時回傳 None
pub fn parse_price(text: &str) -> Option<f64> {
    let token = PRICE_TOKEN.find(text)?.as_str().trim_end_matches(['.', ',']);

    normalize_number(token)
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

/// 兩種分隔符號同時出現時，最後出現者為小數點
fn normalize_number(token: &str) -> String {
    match (token.rfind(','), token.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (Some(_), None) => single_separator(token, ','),
        (None, Some(_)) => single_separator(token, '.'),
        (None, None) => token.to_string(),
    }
}

/// 只有一種分隔符號："1,299" 與 "1.234.567" 是千分位，"12,50" 是小數
fn single_separator(token: &str, separator: char) -> String {
    let groups: Vec<&str> = token.split(separator).collect();
    let grouping = groups.len() > 2 || groups.last().is_some_and(|last| last.len() == 3);
    if grouping {
        token.replace(separator, "")
    } else {
        token.replace(separator, ".")
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// 移除數字與貨幣符號後的殘餘文字
pub fn strip_numeric_noise(text: &str) -> String {
    collapse_whitespace(&NUMERIC_OR_CURRENCY.replace_all(text, " "))
}

/// 從 `/items/123-some-title` 這類路徑還原可讀標題
pub fn title_from_item_url(url: &str) -> Option<String> {
    let caps = ITEM_SLUG.captures(url)?;
    let slug = caps.get(2)?.as_str().replace('-', " ");
    let decoded = urlencoding::decode(&slug)
        .map(|cow| cow.into_owned())
        .unwrap_or(slug);
    let title = collapse_whitespace(&decoded);
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// 環境變數常見的殘留字元：引號、等號、空白與換行
pub fn sanitize_credential(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '"' || c == '\'' || c == '=' || c.is_whitespace())
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_price_detection() {
        assert!(is_bare_price("12,50 €"));
        assert!(is_bare_price(" 7.00"));
        assert!(!is_bare_price("Pokemon Smaragd 12 €"));
        assert!(!is_bare_price("Harry Potter"));
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("12,50 €"), Some(12.5));
        assert_eq!(parse_price("€ 8.99"), Some(8.99));
        assert_eq!(parse_price("1.234,56 €"), Some(1234.56));
        assert_eq!(parse_price("1,234.56 €"), Some(1234.56));
        assert_eq!(parse_price("€1,299.00"), Some(1299.0));
        assert_eq!(parse_price("1,299 €"), Some(1299.0));
        assert_eq!(parse_price("1.299 €"), Some(1299.0));
        assert_eq!(parse_price("1.234.567"), Some(1234567.0));
        assert_eq!(parse_price("ab 3 €"), Some(3.0));
        assert_eq!(parse_price("kostenlos"), None);
    }

    #[test]
    fn test_strip_numeric_noise_keeps_words() {
        assert_eq!(strip_numeric_noise("One Piece Band 12 4,50 €"), "One Piece Band");
        assert_eq!(strip_numeric_noise("  9,99 € "), "");
    }

    #[test]
    fn test_title_from_item_url() {
        assert_eq!(
            title_from_item_url("https://www.vinted.de/items/4711-pokemon-smaragd-edition?ref=x"),
            Some("pokemon smaragd edition".to_string())
        );
        assert_eq!(
            title_from_item_url("/items/12-caf%C3%A9-buch"),
            Some("café buch".to_string())
        );
        assert_eq!(title_from_item_url("https://www.vinted.de/items/4711"), None);
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("äöüß", 2), "äö");
        assert_eq!(truncate_chars("short", 200), "short");
    }

    #[test]
    fn test_sanitize_credential() {
        assert_eq!(sanitize_credential("\"=abc-123\"\r\n"), "abc-123");
        assert_eq!(sanitize_credential("  'PRD-key' "), "PRD-key");
    }
}
