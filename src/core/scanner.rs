use crate::adapters::ebay::SearchLinks;
use crate::core::budget::Deadline;
use crate::core::walker::CatalogWalker;
use crate::domain::language::LanguageFilter;
use crate::domain::model::{
    ArbitrageDeal, CatalogSource, ListingRecord, PriceLookupResult, ScanReport, ScanStats,
    SourceStats,
};
use crate::domain::ports::{Clock, LookupOutcome, PriceLookup};
use crate::utils::error::{Result, ScanError};
use crate::utils::text::{is_bare_price, title_from_item_url};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const PROGRESS_LOG_INTERVAL: usize = 10;

/// 單次掃描解析後的預算設定
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub max_pages: usize,
    pub max_items_per_source: Option<usize>,
    pub category_budget: Duration,
    pub lookup_delay: Duration,
    pub rate_limit_threshold: usize,
    pub safety_margin: Duration,
    /// 預估單次查詢耗時，用來判斷剩餘時間是否足夠
    pub lookup_cost_estimate: Duration,
    pub language: LanguageFilter,
}

/// 單一來源處理期間的查詢狀態
#[derive(Debug, Default)]
struct LookupState {
    consecutive_rate_limits: usize,
    rate_limit_hits: usize,
    lookups_in_source: usize,
}

pub struct ScanOrchestrator {
    walker: CatalogWalker,
    lookup: Option<Arc<dyn PriceLookup>>,
    links: SearchLinks,
    clock: Arc<dyn Clock>,
    settings: ScanSettings,
}

impl ScanOrchestrator {
    pub fn new(
        walker: CatalogWalker,
        lookup: Option<Arc<dyn PriceLookup>>,
        links: SearchLinks,
        clock: Arc<dyn Clock>,
        settings: ScanSettings,
    ) -> Self {
        if lookup.is_none() {
            tracing::warn!("⚠️ No reference marketplace credentials, running in fallback-only mode");
        }
        Self {
            walker,
            lookup,
            links,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// 依序處理所有啟用中的來源；只有完全沒有來源時才會失敗
    pub async fn run(&self, sources: &[CatalogSource]) -> Result<ScanReport> {
        let enabled: Vec<&CatalogSource> = sources.iter().filter(|s| s.enabled).collect();
        if enabled.is_empty() {
            return Err(ScanError::config("No enabled catalog sources configured"));
        }

        let started_at = Utc::now();
        let run_start = self.clock.now();
        let id_prefix = format!("scan-{}", started_at.timestamp_millis());
        tracing::info!("🚀 Starting scan of {} catalog sources", enabled.len());

        let mut deals: Vec<ArbitrageDeal> = Vec::new();
        let mut stats = ScanStats::default();
        let mut lookups_enabled = self.lookup.is_some();

        for source in enabled.iter().copied() {
            let source_stats = self
                .scan_source(source, &id_prefix, &mut deals, &mut stats, &mut lookups_enabled)
                .await;
            stats.per_source_stats.push(source_stats);
        }

        let mut categories: Vec<String> = Vec::new();
        for source in &enabled {
            if !categories.contains(&source.category) {
                categories.push(source.category.clone());
            }
        }

        let duration = self.clock.now().saturating_duration_since(run_start);
        tracing::info!(
            "✅ Scan finished: {} deals ({} priced, {} fallback, {} skipped for time) in {}s",
            deals.len(),
            stats.items_with_price_result,
            stats.items_fallback_only,
            stats.items_skipped_for_timeout,
            duration.as_secs()
        );

        Ok(ScanReport {
            deals,
            stats,
            categories,
            started_at,
            finished_at: Utc::now(),
            duration_secs: duration.as_secs(),
        })
    }

    async fn scan_source(
        &self,
        source: &CatalogSource,
        id_prefix: &str,
        deals: &mut Vec<ArbitrageDeal>,
        stats: &mut ScanStats,
        lookups_enabled: &mut bool,
    ) -> SourceStats {
        let mut source_stats = SourceStats {
            name: source.name.clone(),
            category: source.category.clone(),
            ..SourceStats::default()
        };

        tracing::info!("🔍 Scanning source '{}' ({})", source.name, source.category);
        let walked = match self
            .walker
            .walk(&source.url, self.settings.max_pages, &self.settings.language)
            .await
        {
            Ok(walked) => walked,
            Err(e) => {
                tracing::error!("❌ Source '{}' failed: {}", source.name, e);
                source_stats.error = Some(e.to_string());
                return source_stats;
            }
        };

        let mut items = walked.items;
        if let Some(cap) = self.settings.max_items_per_source {
            if items.len() > cap {
                tracing::info!("✂️ Limiting '{}' to {} of {} items", source.name, cap, items.len());
                items.truncate(cap);
            }
        }
        source_stats.pages_scraped = walked.pages_scraped;
        source_stats.items_scraped = items.len();

        let deadline = Deadline::starting_at(self.clock.now(), self.settings.category_budget);
        let mut state = LookupState::default();

        for (index, listing) in items.iter().enumerate() {
            let now = self.clock.now();
            if deadline.is_exhausted(now, self.settings.safety_margin) {
                let remaining = &items[index..];
                tracing::warn!(
                    "⏱️ Budget for '{}' nearly exhausted after {}s, emitting {} remaining items without lookup",
                    source.name,
                    deadline.elapsed(now).as_secs(),
                    remaining.len()
                );
                for skipped in remaining {
                    let reference = self.fallback_reference(skipped);
                    deals.push(self.make_deal(id_prefix, deals.len(), source, skipped, reference));
                }
                source_stats.skipped_for_timeout += remaining.len();
                stats.items_skipped_for_timeout += remaining.len();
                break;
            }

            let reference = match self
                .try_lookup(listing, &deadline, &mut state, lookups_enabled, &source.name)
                .await
            {
                Some(result) => {
                    source_stats.with_price_result += 1;
                    stats.items_with_price_result += 1;
                    result
                }
                None => {
                    stats.items_fallback_only += 1;
                    self.fallback_reference(listing)
                }
            };
            deals.push(self.make_deal(id_prefix, deals.len(), source, listing, reference));
        }

        source_stats.lookups_attempted = state.lookups_in_source;
        source_stats.rate_limit_errors = state.rate_limit_hits;
        source_stats.deals = items.len();
        source_stats
    }

    /// 條件允許時查詢參考價格；回傳 None 代表改用人工搜尋連結
    async fn try_lookup(
        &self,
        listing: &ListingRecord,
        deadline: &Deadline,
        state: &mut LookupState,
        lookups_enabled: &mut bool,
        source_name: &str,
    ) -> Option<PriceLookupResult> {
        let lookup = self.lookup.as_ref().filter(|_| *lookups_enabled)?;
        if state.consecutive_rate_limits >= self.settings.rate_limit_threshold {
            return None;
        }

        let backoff = self
            .settings
            .lookup_delay
            .saturating_mul(1 + state.consecutive_rate_limits as u32);
        let wait = if state.lookups_in_source == 0 {
            Duration::ZERO
        } else {
            backoff
        };

        let cost = wait + self.settings.lookup_cost_estimate;
        if !deadline.can_afford(self.clock.now(), cost, self.settings.safety_margin) {
            tracing::debug!("Not enough budget left for another lookup in '{}'", source_name);
            return None;
        }

        self.clock.sleep(wait).await;
        state.lookups_in_source += 1;
        if state.lookups_in_source % PROGRESS_LOG_INTERVAL == 0 {
            tracing::info!(
                "📊 '{}': {} lookups done, {}s elapsed",
                source_name,
                state.lookups_in_source,
                deadline.elapsed(self.clock.now()).as_secs()
            );
        }

        match lookup.lookup(&listing.title, listing.condition).await {
            LookupOutcome::Priced(result) if result.is_priced() => {
                state.consecutive_rate_limits = 0;
                Some(result)
            }
            LookupOutcome::Priced(_) | LookupOutcome::NoResult => {
                state.consecutive_rate_limits = 0;
                None
            }
            LookupOutcome::RateLimited => {
                state.consecutive_rate_limits += 1;
                state.rate_limit_hits += 1;
                if state.consecutive_rate_limits == self.settings.rate_limit_threshold {
                    tracing::warn!(
                        "🚫 {} consecutive rate-limit responses, lookups disabled for the rest of '{}'",
                        state.consecutive_rate_limits,
                        source_name
                    );
                }
                None
            }
            LookupOutcome::Fatal(e) => {
                tracing::error!(
                    "❌ Lookups disabled for the remainder of this run: {} ({})",
                    e,
                    e.diagnostic()
                );
                *lookups_enabled = false;
                None
            }
        }
    }

    fn fallback_reference(&self, listing: &ListingRecord) -> PriceLookupResult {
        let title = fallback_title(listing);
        PriceLookupResult {
            price: 0.0,
            url: self.links.search_url(&title, listing.condition),
            title,
        }
    }

    fn make_deal(
        &self,
        id_prefix: &str,
        index: usize,
        source: &CatalogSource,
        listing: &ListingRecord,
        reference: PriceLookupResult,
    ) -> ArbitrageDeal {
        ArbitrageDeal::new(
            format!("{}-{}", id_prefix, index),
            source.category.clone(),
            listing.clone(),
            reference,
            Utc::now(),
        )
    }
}

/// 標題只是價格時改用 URL slug
pub fn fallback_title(listing: &ListingRecord) -> String {
    if is_bare_price(&listing.title) || listing.title.trim().is_empty() {
        title_from_item_url(&listing.url).unwrap_or_else(|| listing.title.clone())
    } else {
        listing.title.clone()
    }
}
