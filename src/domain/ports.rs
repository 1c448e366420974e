use crate::domain::model::{
    ArbitrageDeal, Condition, PriceLookupResult, ReportOutcome, ScanStats, SourceStats,
};
use crate::utils::error::{AuthError, FetchError, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 取得單一目錄頁面的原始 HTML
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// 參考價格查詢的分類結果
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Priced(PriceLookupResult),
    NoResult,
    RateLimited,
    /// 授權失敗，本次掃描剩餘部分不再查詢
    Fatal(AuthError),
}

#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn lookup(&self, title: &str, condition: Condition) -> LookupOutcome;
}

/// 時間來源，測試時可替換為手動推進的時鐘
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
pub trait DealReporter: Send + Sync {
    async fn report(
        &self,
        deals: &[ArbitrageDeal],
        threshold_roi: f64,
        per_source: &[SourceStats],
        stats: &ScanStats,
    ) -> ReportOutcome;
}
