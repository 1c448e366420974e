//! 目錄頁面解析：依序嘗試多組結構選擇器，第一組產出商品的策略獨佔該頁，
//! 全部落空時改用內嵌 JSON 與商品連結的通用解析。

use crate::domain::language::{infer_language, normalize_language};
use crate::domain::model::{Condition, ListingRecord, PLACEHOLDER_IMAGE};
use crate::utils::text::{
    collapse_whitespace, is_bare_price, parse_price, strip_numeric_noise, title_from_item_url,
    truncate_chars, MAX_TITLE_CHARS,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

pub const ITEM_PATH_MARKER: &str = "/items/";
const JSON_MAX_DEPTH: usize = 8;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e:?}"))
}

static PRICE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[data-testid="item-box-price"], [data-testid*="price"], .item-box__price, .price, [class*="price"], [class*="Price"]"#,
    )
});
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[data-testid="item-box-title"], [data-testid*="title"], .item-box__title, h2, h3, h4, [class*="title"]"#,
    )
});
static CONDITION_SEL: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[data-testid="item-box-condition"], [data-testid*="condition"], .item-box__condition, .condition, [class*="condition"]"#,
    )
});
static LANGUAGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[class*="language"], [data-testid*="language"]"#));
static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static STYLED_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[style*="background-image"]"#));
static ITEM_ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[href*="/items/"]"#));
static JSON_SCRIPT_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"script[type="application/json"]"#));
static NEXT_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"a[rel="next"], a[aria-label*="next"], a[aria-label*="Next"], a[aria-label*="weiter"], .pagination__next"#,
    )
});
static PAGINATION_ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[class*="pagination"] a"#));

static BACKGROUND_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).expect("background url pattern")
});

/// 由候選元素建立一筆商品，不合格時回傳 None
pub type RecordBuilder = fn(ElementRef<'_>, &Url) -> Option<ListingRecord>;

pub struct SelectorStrategy {
    pub name: &'static str,
    container: Selector,
    build: RecordBuilder,
}

impl SelectorStrategy {
    pub fn new(
        name: &'static str,
        container_css: &str,
        build: RecordBuilder,
    ) -> Result<Self, String> {
        let container = Selector::parse(container_css)
            .map_err(|e| format!("invalid container selector '{}': {:?}", container_css, e))?;
        Ok(Self {
            name,
            container,
            build,
        })
    }

    pub fn extract(&self, document: &Html, base: &Url) -> Vec<ListingRecord> {
        document
            .select(&self.container)
            .filter_map(|element| (self.build)(element, base))
            .collect()
    }
}

pub fn default_strategies() -> Vec<SelectorStrategy> {
    const CONTAINERS: &[(&str, &str)] = &[
        ("feed-grid", ".feed-grid__item"),
        ("item-box-testid", r#"[data-testid="item-box"]"#),
        ("item-box", ".item-box"),
        ("new-item-box", ".new-item-box"),
        ("article-item-box", r#"article[data-testid="item-box"]"#),
        ("item-box-component", r#"[class*="ItemBox"]"#),
        ("item-box-partial", r#"[class*="item-box"]"#),
        ("feed-children", r#"div[class*="feed"] > div"#),
        ("grid-children", r#"div[class*="grid"] > div"#),
    ];

    CONTAINERS
        .iter()
        .filter_map(|&(name, css)| match SelectorStrategy::new(name, css, build_card_record) {
            Ok(strategy) => Some(strategy),
            Err(e) => {
                tracing::warn!("Skipping selector strategy {}: {}", name, e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub listings: Vec<ListingRecord>,
    /// 頁面上明確的「下一頁」連結
    pub next_page: Option<Url>,
    /// 產出結果的策略名稱，方便追蹤版面變動
    pub strategy: Option<&'static str>,
}

pub struct ListingExtractor {
    strategies: Vec<SelectorStrategy>,
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingExtractor {
    pub fn new() -> Self {
        Self::with_strategies(default_strategies())
    }

    pub fn with_strategies(strategies: Vec<SelectorStrategy>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, markup: &str, base: &Url) -> Vec<ListingRecord> {
        self.extract_page(markup, base).listings
    }

    pub fn extract_page(&self, markup: &str, base: &Url) -> ExtractedPage {
        let document = Html::parse_document(markup);
        let next_page = find_next_page(&document, base);

        for strategy in &self.strategies {
            let listings = strategy.extract(&document, base);
            if !listings.is_empty() {
                tracing::debug!(
                    "Strategy '{}' produced {} listings",
                    strategy.name,
                    listings.len()
                );
                return ExtractedPage {
                    listings,
                    next_page,
                    strategy: Some(strategy.name),
                };
            }
        }

        let embedded = extract_embedded_json(&document, base);
        if !embedded.is_empty() {
            return ExtractedPage {
                listings: embedded,
                next_page,
                strategy: Some("embedded-json"),
            };
        }

        let anchors = extract_item_anchors(&document, base);
        let strategy = (!anchors.is_empty()).then_some("anchor-scan");
        ExtractedPage {
            listings: anchors,
            next_page,
            strategy,
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn own_text(element: ElementRef<'_>) -> String {
    let direct: Vec<&str> = element
        .children()
        .filter_map(|child| child.value().as_text().map(|text| &**text))
        .collect();
    collapse_whitespace(&direct.join(" "))
}

fn usable_title(title: &str) -> bool {
    title.chars().count() > 3 && !is_bare_price(title)
}

fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript") {
        return None;
    }
    base.join(href).ok().map(String::from)
}

fn is_item_url(url: &str) -> bool {
    url.contains(ITEM_PATH_MARKER)
}

fn primary_anchor(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if element.value().name() == "a" && element.value().attr("href").is_some() {
        return Some(element);
    }
    element.select(&ANCHOR_SEL).next().or_else(|| {
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|ancestor| {
                ancestor.value().name() == "a" && ancestor.value().attr("href").is_some()
            })
    })
}

fn extract_price(element: ElementRef<'_>) -> f64 {
    let labeled = element
        .select(&PRICE_SEL)
        .map(element_text)
        .find(|text| !text.is_empty());

    let text = labeled.or_else(|| {
        element
            .select(&SPAN_SEL)
            .map(element_text)
            .find(|text| text.contains('€'))
    });

    text.as_deref().and_then(parse_price).unwrap_or(0.0)
}

fn extract_title(element: ElementRef<'_>, anchor: Option<ElementRef<'_>>, url: &str) -> Option<String> {
    let labeled = element
        .select(&TITLE_SEL)
        .map(element_text)
        .find(|text| !text.is_empty());
    if let Some(title) = labeled.filter(|t| usable_title(t)) {
        return Some(title);
    }

    let attribute = element
        .value()
        .attr("title")
        .or_else(|| anchor.and_then(|a| a.value().attr("title")))
        .map(collapse_whitespace);
    if let Some(title) = attribute.filter(|t| usable_title(t)) {
        return Some(title);
    }

    if let Some(anchor_text) = anchor.map(element_text) {
        if usable_title(&anchor_text) {
            return Some(anchor_text);
        }
    }

    let residual = strip_numeric_noise(&own_text(element));
    if usable_title(&residual) {
        return Some(residual);
    }

    title_from_item_url(url).filter(|t| usable_title(t))
}

fn extract_image(element: ElementRef<'_>, base: &Url) -> String {
    let from_img = element.select(&IMG_SEL).next().and_then(|img| {
        ["src", "data-src", "data-lazy-src", "data-original"]
            .iter()
            .filter_map(|attr| img.value().attr(attr))
            .find(|value| !value.trim().is_empty())
            .map(str::to_string)
    });

    let from_style = || {
        element.select(&STYLED_SEL).next().and_then(|styled| {
            let style = styled.value().attr("style")?;
            BACKGROUND_URL
                .captures(style)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
    };

    from_img
        .or_else(from_style)
        .and_then(|src| resolve_url(base, &src))
        .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
}

fn extract_condition(element: ElementRef<'_>) -> Condition {
    element
        .select(&CONDITION_SEL)
        .map(element_text)
        .find(|text| !text.is_empty())
        .map(|label| Condition::from_label(&label))
        .unwrap_or_default()
}

fn extract_language(element: ElementRef<'_>) -> Option<String> {
    let labeled = element.select(&LANGUAGE_SEL).next().and_then(|el| {
        let text = element_text(el);
        if text.is_empty() {
            el.value().attr("title").map(str::to_string)
        } else {
            Some(text)
        }
    });

    match labeled.filter(|label| !label.trim().is_empty()) {
        Some(label) => Some(normalize_language(&label)),
        None => infer_language(&element_text(element)),
    }
}

/// 商品卡片：價格 → 連結 → 標題（多層退路）→ 圖片、狀態、語言
pub fn build_card_record(element: ElementRef<'_>, base: &Url) -> Option<ListingRecord> {
    let price = extract_price(element);

    let anchor = primary_anchor(element);
    let url = anchor
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_url(base, href))
        .filter(|url| is_item_url(url))?;

    let title = extract_title(element, anchor, &url)?;

    Some(ListingRecord {
        title: truncate_chars(&title, MAX_TITLE_CHARS),
        price,
        url,
        image_url: extract_image(element, base),
        condition: extract_condition(element),
        language: extract_language(element),
    })
}

fn extract_item_anchors(document: &Html, base: &Url) -> Vec<ListingRecord> {
    document
        .select(&ITEM_ANCHOR_SEL)
        .filter_map(|anchor| {
            let url = anchor
                .value()
                .attr("href")
                .and_then(|href| resolve_url(base, href))
                .filter(|url| is_item_url(url))?;

            let text = element_text(anchor);
            let title = if text.is_empty() {
                anchor.value().attr("title").map(collapse_whitespace)?
            } else {
                text
            };
            if title.chars().count() <= 5 || is_bare_price(&title) {
                return None;
            }

            let price = anchor
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|ancestor| matches!(ancestor.value().name(), "div" | "article" | "section"))
                .map(extract_price)
                .unwrap_or(0.0);

            Some(ListingRecord {
                title: truncate_chars(&title, MAX_TITLE_CHARS),
                price,
                url,
                image_url: PLACEHOLDER_IMAGE.to_string(),
                condition: Condition::default(),
                language: None,
            })
        })
        .collect()
}

fn extract_embedded_json(document: &Html, base: &Url) -> Vec<ListingRecord> {
    let mut records = Vec::new();
    for script in document.select(&JSON_SCRIPT_SEL) {
        let body: String = script.text().collect();
        if !body.contains("items") {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => collect_json_items(&value, base, 0, &mut records),
            Err(e) => tracing::debug!("Ignoring unparsable embedded JSON block: {}", e),
        }
    }
    records
}

fn collect_json_items(
    value: &serde_json::Value,
    base: &Url,
    depth: usize,
    out: &mut Vec<ListingRecord>,
) {
    if depth > JSON_MAX_DEPTH {
        return;
    }

    match value {
        serde_json::Value::Array(values) => {
            for item in values {
                collect_json_items(item, base, depth + 1, out);
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(record) = json_item_record(map, base) {
                out.push(record);
                return;
            }
            for nested in map.values() {
                collect_json_items(nested, base, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn json_str<'a>(map: &'a serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| map.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.trim().is_empty())
}

fn json_price(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_price(s),
        serde_json::Value::Object(map) => map.get("amount").and_then(json_price),
        _ => None,
    }
}

fn json_item_record(
    map: &serde_json::Map<String, serde_json::Value>,
    base: &Url,
) -> Option<ListingRecord> {
    let title = collapse_whitespace(json_str(map, &["title", "name"])?);
    let url = json_str(map, &["url", "web_url", "path"])
        .and_then(|href| resolve_url(base, href))
        .filter(|url| is_item_url(url))?;
    if !usable_title(&title) {
        return None;
    }

    let price = ["price", "price_value", "total_item_price"]
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(json_price)
        .filter(|p| p.is_finite() && *p >= 0.0)
        .unwrap_or(0.0);

    let image = json_str(map, &["image_url"])
        .map(str::to_string)
        .or_else(|| {
            map.get("photo")
                .and_then(|photo| photo.get("url"))
                .and_then(|u| u.as_str())
                .map(str::to_string)
        })
        .and_then(|src| resolve_url(base, &src))
        .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());

    let condition = json_str(map, &["condition", "status"])
        .map(Condition::from_label)
        .unwrap_or_default();

    Some(ListingRecord {
        title: truncate_chars(&title, MAX_TITLE_CHARS),
        price,
        url,
        image_url: image,
        condition,
        language: None,
    })
}

/// 尋找明確的下一頁連結
pub fn find_next_page(document: &Html, base: &Url) -> Option<Url> {
    let explicit = document
        .select(&NEXT_LINK_SEL)
        .filter_map(|el| el.value().attr("href"))
        .find(|href| !href.contains("javascript"));

    let arrow = || {
        document
            .select(&PAGINATION_ANCHOR_SEL)
            .filter(|a| matches!(element_text(*a).as_str(), "›" | ">" | "»"))
            .filter_map(|a| a.value().attr("href"))
            .find(|href| !href.contains("javascript"))
    };

    explicit
        .or_else(arrow)
        .and_then(|href| base.join(href.trim()).ok())
}
