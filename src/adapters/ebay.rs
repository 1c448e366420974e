//! 參考市場（eBay Browse API）價格查詢
//!
//! - client-credentials 取得 bearer token，交給 [`TokenCache`] 管理
//! - 每筆商品查一次：價格由低到高、只取一筆、直購、同國配送
//! - 回應分類為 [`LookupOutcome`]，呼叫端不會收到未分類的錯誤

use crate::adapters::token::TokenCache;
use crate::domain::model::{Condition, PriceLookupResult};
use crate::domain::ports::{Clock, LookupOutcome, PriceLookup};
use crate::utils::error::AuthError;
use crate::utils::text::sanitize_credential;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://api.ebay.com/identity/v1/oauth2/token";
pub const DEFAULT_BROWSE_URL: &str = "https://api.ebay.com/buy/browse/v1/item_summary/search";
pub const DEFAULT_SITE_URL: &str = "https://www.ebay.de";
pub const DEFAULT_MARKETPLACE_ID: &str = "EBAY_DE";

const OAUTH_SCOPE: &str = "https://api.ebay.com/oauth/api_scope";
const MARKETPLACE_HEADER: &str = "X-EBAY-C-MARKETPLACE-ID";
/// Browse API 的速率限制錯誤碼
const RATE_LIMIT_ERROR_ID: u64 = 2001;
/// 正式環境金鑰的最短長度
pub const MIN_CREDENTIAL_LENGTH: usize = 20;

#[derive(Clone, PartialEq, Eq)]
pub struct EbayCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub marketplace_id: String,
}

impl EbayCredentials {
    /// 清理環境變數殘留字元後檢查長度
    pub fn new(client_id: &str, client_secret: &str, marketplace_id: &str) -> Result<Self, AuthError> {
        let client_id = sanitize_credential(client_id);
        let client_secret = sanitize_credential(client_secret);
        let marketplace_id = match sanitize_credential(marketplace_id) {
            id if id.is_empty() => DEFAULT_MARKETPLACE_ID.to_string(),
            id => id,
        };

        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        for (field, value) in [("client_id", &client_id), ("client_secret", &client_secret)] {
            let length = value.chars().count();
            if length < MIN_CREDENTIAL_LENGTH {
                return Err(AuthError::MalformedCredentials {
                    field,
                    length,
                    expected: MIN_CREDENTIAL_LENGTH,
                });
            }
        }

        Ok(Self {
            client_id,
            client_secret,
            marketplace_id,
        })
    }

    /// EBAY_DE -> DE
    pub fn delivery_country(&self) -> &str {
        self.marketplace_id
            .rsplit('_')
            .next()
            .filter(|country| country.len() == 2)
            .unwrap_or("DE")
    }
}

impl fmt::Debug for EbayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EbayCredentials")
            .field("client_id_len", &self.client_id.len())
            .field("client_secret_len", &self.client_secret.len())
            .field("marketplace_id", &self.marketplace_id)
            .finish()
    }
}

/// 手動查價用連結
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLinks {
    site_url: String,
    marketplace_id: String,
}

impl Default for SearchLinks {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_URL, DEFAULT_MARKETPLACE_ID)
    }
}

impl SearchLinks {
    pub fn new(site_url: &str, marketplace_id: &str) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            marketplace_id: marketplace_id.to_string(),
        }
    }

    /// 1000 = 全新，3000 = 二手
    pub fn condition_code(condition: Condition) -> &'static str {
        if condition.is_new() {
            "1000"
        } else {
            "3000"
        }
    }

    pub fn search_url(&self, title: &str, condition: Condition) -> String {
        format!(
            "{}/sch/i.html?_nkw={}&LH_Complete=1&LH_ItemCondition={}",
            self.site_url,
            urlencoding::encode(title),
            Self::condition_code(condition)
        )
    }

    pub fn research_url(&self, title: &str) -> String {
        format!(
            "{}/sh/research?marketplace={}&tabName=SOLD&keywords={}",
            self.site_url,
            self.marketplace_id.replace('_', "-"),
            urlencoding::encode(title)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EbaySettings {
    pub auth_url: String,
    pub browse_url: String,
    pub timeout_secs: u64,
}

impl Default for EbaySettings {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            browse_url: DEFAULT_BROWSE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    item_summaries: Vec<ItemSummary>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary {
    title: Option<String>,
    price: Option<Amount>,
    #[serde(default)]
    shipping_options: Vec<ShippingOption>,
    item_web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippingOption {
    shipping_cost: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct Amount {
    value: String,
}

impl Amount {
    fn parse(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    error_id: Option<u64>,
    message: Option<String>,
}

impl SearchResponse {
    fn is_rate_limited(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.error_id == Some(RATE_LIMIT_ERROR_ID))
    }
}

impl ItemSummary {
    /// 商品價格加上最便宜的運費
    fn total_price(&self) -> f64 {
        let price = self.price.as_ref().and_then(Amount::parse).unwrap_or(0.0);
        let shipping = self
            .shipping_options
            .iter()
            .filter_map(|option| option.shipping_cost.as_ref().and_then(Amount::parse))
            .fold(None, |cheapest: Option<f64>, cost| {
                Some(cheapest.map_or(cost, |c| c.min(cost)))
            })
            .unwrap_or(0.0);
        price + shipping
    }
}

pub struct EbayBrowseClient {
    client: Client,
    credentials: EbayCredentials,
    settings: EbaySettings,
    tokens: Arc<TokenCache>,
    links: SearchLinks,
}

impl EbayBrowseClient {
    pub fn new(
        credentials: EbayCredentials,
        settings: EbaySettings,
        tokens: Arc<TokenCache>,
        links: SearchLinks,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            credentials,
            settings,
            tokens,
            links,
        })
    }

    /// 用預設端點與新的 token 快取建立
    pub fn with_clock(credentials: EbayCredentials, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let links = SearchLinks::new(DEFAULT_SITE_URL, &credentials.marketplace_id);
        Self::new(
            credentials,
            EbaySettings::default(),
            Arc::new(TokenCache::new(clock)),
            links,
        )
    }

    async fn exchange_token(&self) -> Result<(String, Duration), AuthError> {
        tracing::debug!(
            "Requesting reference marketplace token (client id {} chars)",
            self.credentials.client_id.len()
        );

        let response = self
            .client
            .post(&self.settings.auth_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", OAUTH_SCOPE)])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok((token.access_token, Duration::from_secs(token.expires_in)))
    }

    fn search_filter(&self, condition: Condition) -> String {
        let bucket = if condition.is_new() { "NEW" } else { "USED" };
        format!(
            "buyingOptions:{{FIXED_PRICE}},conditions:{{{}}},deliveryCountry:{}",
            bucket,
            self.credentials.delivery_country()
        )
    }

    async fn search(&self, token: &str, title: &str, condition: Condition) -> LookupOutcome {
        let filter = self.search_filter(condition);
        let response = match self
            .client
            .get(&self.settings.browse_url)
            .bearer_auth(token)
            .header(MARKETPLACE_HEADER, &self.credentials.marketplace_id)
            .query(&[
                ("q", title),
                ("sort", "price"),
                ("limit", "1"),
                ("filter", filter.as_str()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("⚠️ Price search request failed for '{}': {}", title, e);
                return LookupOutcome::NoResult;
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return LookupOutcome::RateLimited;
        }

        let body: SearchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("⚠️ Unreadable price search response ({}): {}", status, e);
                return LookupOutcome::NoResult;
            }
        };

        if body.is_rate_limited() {
            return LookupOutcome::RateLimited;
        }

        if !status.is_success() {
            let message = body
                .errors
                .first()
                .and_then(|e| e.message.as_deref())
                .unwrap_or("no error detail");
            tracing::warn!("⚠️ Price search returned {}: {}", status, message);
            return LookupOutcome::NoResult;
        }

        let Some(item) = body.item_summaries.first() else {
            return LookupOutcome::NoResult;
        };

        let total = item.total_price();
        if total <= 0.0 {
            return LookupOutcome::NoResult;
        }

        LookupOutcome::Priced(PriceLookupResult {
            price: total,
            url: item
                .item_web_url
                .clone()
                .unwrap_or_else(|| self.links.search_url(title, condition)),
            title: item.title.clone().unwrap_or_else(|| title.to_string()),
        })
    }
}

#[async_trait]
impl PriceLookup for EbayBrowseClient {
    async fn lookup(&self, title: &str, condition: Condition) -> LookupOutcome {
        let token = match self.tokens.get_or_refresh(|| self.exchange_token()).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("❌ Reference marketplace authentication failed: {}", e);
                tracing::error!("💡 {}", e.diagnostic());
                return LookupOutcome::Fatal(e);
            }
        };

        self.search(&token, title, condition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::ManualClock;
    use httpmock::prelude::*;
    use serde_json::json;

    const CLIENT_ID: &str = "ArbitrageScan-PRD-0123456789abcdef";
    const CLIENT_SECRET: &str = "PRD-0123456789abcdef-0123-4567";

    fn credentials() -> EbayCredentials {
        EbayCredentials::new(CLIENT_ID, CLIENT_SECRET, "EBAY_DE").unwrap()
    }

    fn client(server: &MockServer, clock: Arc<ManualClock>) -> EbayBrowseClient {
        EbayBrowseClient::new(
            credentials(),
            EbaySettings {
                auth_url: server.url("/identity/v1/oauth2/token"),
                browse_url: server.url("/buy/browse/v1/item_summary/search"),
                timeout_secs: 5,
            },
            Arc::new(TokenCache::new(clock)),
            SearchLinks::default(),
        )
        .unwrap()
    }

    fn token_mock(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/identity/v1/oauth2/token")
                .header_exists("authorization")
                .body_contains("grant_type=client_credentials");
            then.status(200).json_body(json!({
                "access_token": "v^1.1#token",
                "expires_in": 7200,
                "token_type": "Application Access Token"
            }));
        })
    }

    fn priced_body() -> serde_json::Value {
        json!({
            "total": 1,
            "itemSummaries": [{
                "title": "One Piece Band 1 Manga",
                "price": {"value": "12.50", "currency": "EUR"},
                "shippingOptions": [
                    {"shippingCost": {"value": "4.00", "currency": "EUR"}},
                    {"shippingCost": {"value": "1.99", "currency": "EUR"}}
                ],
                "itemWebUrl": "https://www.ebay.de/itm/1234"
            }]
        })
    }

    #[test]
    fn test_credentials_are_sanitized_and_length_checked() {
        let creds = EbayCredentials::new(&format!("\"{}\"\n", CLIENT_ID), CLIENT_SECRET, "").unwrap();
        assert_eq!(creds.client_id, CLIENT_ID);
        assert_eq!(creds.marketplace_id, "EBAY_DE");
        assert_eq!(creds.delivery_country(), "DE");

        let err = EbayCredentials::new("short-id", CLIENT_SECRET, "EBAY_DE").unwrap_err();
        assert_eq!(
            err,
            AuthError::MalformedCredentials {
                field: "client_id",
                length: 8,
                expected: MIN_CREDENTIAL_LENGTH
            }
        );
        assert_eq!(
            EbayCredentials::new("", "", "EBAY_DE").unwrap_err(),
            AuthError::MissingCredentials
        );
        assert!(!format!("{:?}", creds).contains(CLIENT_SECRET));
    }

    #[test]
    fn test_search_links() {
        let links = SearchLinks::default();
        assert_eq!(
            links.search_url("One Piece & Co", Condition::Good),
            "https://www.ebay.de/sch/i.html?_nkw=One%20Piece%20%26%20Co&LH_Complete=1&LH_ItemCondition=3000"
        );
        assert!(links
            .search_url("Zelda", Condition::NewWithTag)
            .ends_with("LH_ItemCondition=1000"));
        assert_eq!(
            links.research_url("Zelda"),
            "https://www.ebay.de/sh/research?marketplace=EBAY-DE&tabName=SOLD&keywords=Zelda"
        );
    }

    #[tokio::test]
    async fn test_lookup_prices_with_cheapest_shipping_and_caches_token() {
        let server = MockServer::start();
        let token = token_mock(&server);
        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/buy/browse/v1/item_summary/search")
                .header("authorization", "Bearer v^1.1#token")
                .header("x-ebay-c-marketplace-id", "EBAY_DE")
                .query_param("sort", "price")
                .query_param("limit", "1")
                .query_param(
                    "filter",
                    "buyingOptions:{FIXED_PRICE},conditions:{USED},deliveryCountry:DE",
                );
            then.status(200).json_body(priced_body());
        });

        let clock = Arc::new(ManualClock::new());
        let client = client(&server, clock.clone());

        let first = client.lookup("One Piece Band 1", Condition::VeryGood).await;
        let second = client.lookup("One Piece Band 2", Condition::Good).await;

        token.assert_hits(1);
        search.assert_hits(2);
        match first {
            LookupOutcome::Priced(result) => {
                assert!((result.price - 14.49).abs() < 1e-9);
                assert_eq!(result.url, "https://www.ebay.de/itm/1234");
                assert_eq!(result.title, "One Piece Band 1 Manga");
            }
            other => panic!("expected priced outcome, got {:?}", other),
        }
        assert!(matches!(second, LookupOutcome::Priced(_)));
    }

    #[tokio::test]
    async fn test_expired_token_triggers_one_more_exchange() {
        let server = MockServer::start();
        let token = token_mock(&server);
        server.mock(|when, then| {
            when.method(GET).path("/buy/browse/v1/item_summary/search");
            then.status(200).json_body(priced_body());
        });

        let clock = Arc::new(ManualClock::new());
        let client = client(&server, clock.clone());

        client.lookup("Zelda", Condition::New).await;
        clock.advance(Duration::from_secs(7200));
        client.lookup("Zelda", Condition::New).await;
        client.lookup("Zelda", Condition::New).await;

        token.assert_hits(2);
    }

    #[tokio::test]
    async fn test_rate_limit_classification() {
        let server = MockServer::start();
        token_mock(&server);
        server.mock(|when, then| {
            when.method(GET).query_param("q", "too-many");
            then.status(429);
        });
        server.mock(|when, then| {
            when.method(GET).query_param("q", "quota");
            then.status(500).json_body(json!({
                "errors": [{"errorId": 2001, "message": "Too many requests"}]
            }));
        });

        let client = client(&server, Arc::new(ManualClock::new()));
        assert_eq!(
            client.lookup("too-many", Condition::Used).await,
            LookupOutcome::RateLimited
        );
        assert_eq!(
            client.lookup("quota", Condition::Used).await,
            LookupOutcome::RateLimited
        );
    }

    #[tokio::test]
    async fn test_zero_total_and_errors_are_no_result() {
        let server = MockServer::start();
        token_mock(&server);
        server.mock(|when, then| {
            when.method(GET).query_param("q", "free");
            then.status(200).json_body(json!({
                "itemSummaries": [{"title": "Free", "price": {"value": "0.00"}}]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).query_param("q", "empty");
            then.status(200).json_body(json!({"total": 0}));
        });
        server.mock(|when, then| {
            when.method(GET).query_param("q", "broken");
            then.status(500).body("upstream exploded");
        });

        let client = client(&server, Arc::new(ManualClock::new()));
        for title in ["free", "empty", "broken"] {
            assert_eq!(
                client.lookup(title, Condition::Used).await,
                LookupOutcome::NoResult,
                "title {}",
                title
            );
        }
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_fatal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/identity/v1/oauth2/token");
            then.status(401).json_body(json!({"error": "invalid_client"}));
        });

        let client = client(&server, Arc::new(ManualClock::new()));
        match client.lookup("Zelda", Condition::Used).await {
            LookupOutcome::Fatal(AuthError::Rejected { status, detail }) => {
                assert_eq!(status, 401);
                assert!(detail.contains("invalid_client"));
            }
            other => panic!("expected fatal outcome, got {:?}", other),
        }
    }
}
