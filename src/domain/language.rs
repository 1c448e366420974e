//! 目錄語言篩選與語言推斷

use regex::Regex;
use std::sync::LazyLock;

/// (正規名稱, 目錄 language_book_ids, 別名)
const LANGUAGES: &[(&str, &str, &[&str])] = &[
    ("German", "6437", &["german", "deutsch"]),
    ("English", "6435", &["english", "englisch"]),
    ("French", "6436", &["french", "französisch", "français", "francais"]),
    ("Dutch", "6441", &["dutch", "niederländisch", "nederlands"]),
    ("Italian", "6439", &["italian", "italienisch", "italiano"]),
];

pub const LANGUAGE_QUERY_PARAM: &str = "language_book_ids[]";

static LANGUAGE_WORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    LANGUAGES
        .iter()
        .flat_map(|(name, _, aliases)| {
            aliases.iter().filter_map(move |alias| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(alias)))
                    .ok()
                    .map(|re| (re, *name))
            })
        })
        .collect()
});

/// 把語言標籤正規化；無法辨識時保留原文
pub fn normalize_language(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    LANGUAGES
        .iter()
        .find(|(_, _, aliases)| aliases.iter().any(|alias| lowered.contains(alias)))
        .map(|(name, _, _)| name.to_string())
        .unwrap_or_else(|| label.trim().to_string())
}

/// 在整段文字中尋找完整的語言單字
pub fn infer_language(text: &str) -> Option<String> {
    LANGUAGE_WORDS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, name)| name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageFilter {
    Any,
    Only { name: &'static str, book_id: &'static str },
}

impl LanguageFilter {
    /// "any" / "all" / "Alle Sprachen" / 空字串 代表不篩選；未知語言同樣不篩選
    pub fn parse(value: &str) -> Self {
        let lowered = value.trim().to_lowercase();
        if matches!(lowered.as_str(), "" | "any" | "all" | "alle sprachen") {
            return LanguageFilter::Any;
        }

        let known = LANGUAGES.iter().find(|(name, _, aliases)| {
            name.to_lowercase() == lowered || aliases.iter().any(|alias| *alias == lowered)
        });

        match known {
            Some((name, book_id, _)) => LanguageFilter::Only {
                name: *name,
                book_id: *book_id,
            },
            None => {
                tracing::warn!(
                    "⚠️ Unknown language filter '{}', scanning without language filter",
                    value
                );
                LanguageFilter::Any
            }
        }
    }

    /// 將篩選條件寫入 URL，取代既有的 language_book_ids[]
    pub fn apply(&self, url: &mut url::Url) {
        let LanguageFilter::Only { book_id, .. } = self else {
            return;
        };

        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != LANGUAGE_QUERY_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(LANGUAGE_QUERY_PARAM, book_id);
    }
}
