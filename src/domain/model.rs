use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 轉售平台手續費比例（以參考價格計）
pub const REFERENCE_FEE_RATE: f64 = 0.11;
/// 固定運費估計
pub const SHIPPING_COST: f64 = 4.50;
pub const PLACEHOLDER_IMAGE: &str = "https://placehold.co/400?text=No+Image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    NewWithTag,
    New,
    VeryGood,
    Good,
    Acceptable,
    #[default]
    Used,
}

impl Condition {
    /// 將目錄上的狀態文字（德文或英文）正規化
    pub fn from_label(label: &str) -> Self {
        let normalized = label.to_lowercase();
        let is_new = normalized.contains("neu") || normalized.contains("new");
        let without_tag = normalized.contains("ohne") || normalized.contains("without");
        let has_tag =
            !without_tag && (normalized.contains("etikett") || normalized.contains("tag"));

        if is_new && has_tag {
            Condition::NewWithTag
        } else if is_new {
            Condition::New
        } else if normalized.contains("sehr gut") || normalized.contains("very good") {
            Condition::VeryGood
        } else if normalized.contains("gut") || normalized.contains("good") {
            Condition::Good
        } else if normalized.contains("akzeptabel")
            || normalized.contains("acceptable")
            || normalized.contains("zufriedenstellend")
            || normalized.contains("satisfactory")
        {
            Condition::Acceptable
        } else {
            Condition::Used
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Condition::NewWithTag | Condition::New)
    }

    pub fn label(self) -> &'static str {
        match self {
            Condition::NewWithTag => "New with tag",
            Condition::New => "New",
            Condition::VeryGood => "Very good",
            Condition::Good => "Good",
            Condition::Acceptable => "Acceptable",
            Condition::Used => "Used",
        }
    }
}

/// 目錄上抓到的一筆商品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub title: String,
    pub price: f64,
    pub url: String,
    pub image_url: String,
    pub condition: Condition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// 參考市場查詢結果，price 為 0 代表沒有可用結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLookupResult {
    pub price: f64,
    pub url: String,
    pub title: String,
}

impl PriceLookupResult {
    pub fn is_priced(&self) -> bool {
        self.price > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    #[default]
    New,
    Viewed,
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DealMetrics {
    pub profit: f64,
    pub profit_after_fees: f64,
    pub roi: f64,
}

impl DealMetrics {
    /// 兩邊價格都大於 0 才計算，否則全部為 0
    pub fn compute(source_price: f64, reference_price: f64) -> Self {
        let usable = |p: f64| p.is_finite() && p > 0.0;
        if !usable(source_price) || !usable(reference_price) {
            return Self::default();
        }

        let profit = reference_price - source_price;
        let fees = reference_price * REFERENCE_FEE_RATE;
        Self {
            profit,
            profit_after_fees: profit - fees - SHIPPING_COST,
            roi: profit / source_price * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrageDeal {
    pub id: String,
    pub category: String,
    pub source: ListingRecord,
    pub reference: PriceLookupResult,
    pub profit: f64,
    pub profit_after_fees: f64,
    pub roi: f64,
    pub found_at: DateTime<Utc>,
    pub status: DealStatus,
}

impl ArbitrageDeal {
    pub fn new(
        id: String,
        category: String,
        source: ListingRecord,
        reference: PriceLookupResult,
        found_at: DateTime<Utc>,
    ) -> Self {
        let metrics = DealMetrics::compute(source.price, reference.price);
        Self {
            id,
            category,
            source,
            reference,
            profit: metrics.profit,
            profit_after_fees: metrics.profit_after_fees,
            roi: metrics.roi,
            found_at,
            status: DealStatus::New,
        }
    }
}

/// 目錄來源設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_category() -> String {
    "Uncategorized".to_string()
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub name: String,
    pub category: String,
    pub pages_scraped: usize,
    pub items_scraped: usize,
    pub deals: usize,
    pub with_price_result: usize,
    pub lookups_attempted: usize,
    pub rate_limit_errors: usize,
    pub skipped_for_timeout: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub items_with_price_result: usize,
    pub items_fallback_only: usize,
    pub items_skipped_for_timeout: usize,
    pub per_source_stats: Vec<SourceStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub deals: Vec<ArbitrageDeal>,
    pub stats: ScanStats,
    pub categories: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: u64,
}

/// 報表輸出結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub success: bool,
    pub message: String,
    pub filtered_count: usize,
}
