use crate::core::extractor::ListingExtractor;
use crate::domain::language::LanguageFilter;
use crate::domain::model::ListingRecord;
use crate::domain::ports::PageFetcher;
use crate::utils::error::{FetchError, WalkError};
use std::sync::Arc;
use url::Url;

pub const PAGE_QUERY_PARAM: &str = "page";
/// 連續空頁上限
pub const MAX_CONSECUTIVE_EMPTY_PAGES: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkResult {
    pub items: Vec<ListingRecord>,
    pub pages_scraped: usize,
}

/// 串接頁面抓取與解析，沿著分頁前進直到停止條件成立
pub struct CatalogWalker {
    fetcher: Arc<dyn PageFetcher>,
    extractor: ListingExtractor,
    retry_attempts: u32,
}

impl CatalogWalker {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            extractor: ListingExtractor::new(),
            retry_attempts: 0,
        }
    }

    pub fn with_extractor(mut self, extractor: ListingExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub async fn walk(
        &self,
        seed_url: &str,
        max_pages: usize,
        language: &LanguageFilter,
    ) -> Result<WalkResult, WalkError> {
        let mut current = Url::parse(seed_url).map_err(|e| WalkError::InvalidSeedUrl {
            url: seed_url.to_string(),
            reason: e.to_string(),
        })?;
        language.apply(&mut current);

        let mut result = WalkResult::default();
        let mut consecutive_empty = 0;

        while result.pages_scraped < max_pages {
            tracing::info!("📄 Scraping page {}: {}", result.pages_scraped + 1, current);

            let page = match self.fetch_with_retry(current.as_str()).await {
                Ok(markup) => self.extractor.extract_page(&markup, &current),
                Err(e) => {
                    tracing::warn!("⚠️ Page fetch failed, treating as empty: {}", e);
                    Default::default()
                }
            };
            result.pages_scraped += 1;

            if page.listings.is_empty() {
                consecutive_empty += 1;
                tracing::debug!(
                    "Empty page ({} consecutive) at {}",
                    consecutive_empty,
                    current
                );
                if consecutive_empty >= MAX_CONSECUTIVE_EMPTY_PAGES {
                    tracing::info!("🛑 Stopping after {} consecutive empty pages", consecutive_empty);
                    break;
                }
            } else {
                consecutive_empty = 0;
                tracing::info!(
                    "✅ Extracted {} listings via {}",
                    page.listings.len(),
                    page.strategy.unwrap_or("unknown")
                );
                result.items.extend(page.listings);
            }

            let next = page
                .next_page
                .map(|mut explicit| {
                    language.apply(&mut explicit);
                    explicit
                })
                .filter(|explicit| *explicit != current)
                .or_else(|| next_page_url(&current));
            match next {
                Some(mut next_url) => {
                    language.apply(&mut next_url);
                    current = next_url;
                }
                None => break,
            }
        }

        tracing::info!(
            "📦 Walk finished: {} listings from {} pages",
            result.items.len(),
            result.pages_scraped
        );
        Ok(result)
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(url).await {
                Ok(markup) => return Ok(markup),
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::debug!("Retrying {} (attempt {}): {}", url, attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 將 page 參數加一；沒有 page 參數時視為第 1 頁
pub fn next_page_url(current: &Url) -> Option<Url> {
    let current_page = current
        .query_pairs()
        .find(|(key, _)| key == PAGE_QUERY_PARAM)
        .and_then(|(_, value)| value.parse::<u64>().ok())
        .unwrap_or(1);

    let retained: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(key, _)| key != PAGE_QUERY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = current.clone();
    {
        let mut pairs = next.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(PAGE_QUERY_PARAM, &(current_page.checked_add(1)?).to_string());
    }
    Some(next)
}
