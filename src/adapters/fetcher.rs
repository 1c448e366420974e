use crate::domain::ports::{Clock, PageFetcher};
use crate::utils::error::FetchError;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FetcherSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
    pub accept_language: String,
    /// 作為 Referer 送出的目錄首頁
    pub referer: Option<String>,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 2000,
            max_delay_ms: 5000,
            timeout_secs: 30,
            accept_language: "de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            referer: None,
        }
    }
}

/// 以 HTTP GET 取得目錄頁面，每次請求前隨機等待並輪替 User-Agent
pub struct HttpPageFetcher {
    client: Client,
    settings: FetcherSettings,
    clock: Arc<dyn Clock>,
}

impl HttpPageFetcher {
    pub fn new(settings: FetcherSettings, clock: Arc<dyn Clock>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            settings,
            clock,
        })
    }

    fn jittered_delay(&self) -> Duration {
        let low = self.settings.min_delay_ms.min(self.settings.max_delay_ms);
        let high = self.settings.min_delay_ms.max(self.settings.max_delay_ms);
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    fn pick_user_agent(&self) -> &'static str {
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let delay = self.jittered_delay();
        let user_agent = self.pick_user_agent();

        tracing::debug!("⏳ Waiting {}ms before fetching {}", delay.as_millis(), url);
        self.clock.sleep(delay).await;

        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, &self.settings.accept_language)
            .header(reqwest::header::CACHE_CONTROL, "no-cache");

        if let Some(referer) = &self.settings.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.settings.timeout_secs)
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        tracing::debug!("Catalog response status: {}", status);
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.settings.timeout_secs)
            } else {
                FetchError::Network(e.to_string())
            }
        })
    }
}
