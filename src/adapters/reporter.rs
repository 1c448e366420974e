use crate::adapters::ebay::SearchLinks;
use crate::domain::model::{ArbitrageDeal, ReportOutcome, ScanStats, SourceStats};
use crate::domain::ports::{DealReporter, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write as _;

pub const CSV_FILENAME: &str = "deals.csv";
pub const HTML_FILENAME: &str = "digest.html";

#[derive(Debug, Serialize)]
struct DealRow<'a> {
    id: &'a str,
    category: &'a str,
    title: &'a str,
    condition: &'a str,
    source_price: f64,
    reference_price: f64,
    profit: f64,
    profit_after_fees: f64,
    roi: f64,
    source_url: &'a str,
    reference_url: &'a str,
    research_url: String,
}

/// 把達到 ROI 門檻的商品寫成 CSV 與 HTML 摘要
pub struct DigestReporter<S: Storage> {
    storage: S,
    links: SearchLinks,
}

impl<S: Storage> DigestReporter<S> {
    pub fn new(storage: S, links: SearchLinks) -> Self {
        Self { storage, links }
    }

    /// 依 ROI 由高到低排序，只保留達到門檻者
    pub fn select_deals(deals: &[ArbitrageDeal], threshold_roi: f64) -> Vec<&ArbitrageDeal> {
        let mut selected: Vec<&ArbitrageDeal> =
            deals.iter().filter(|deal| deal.roi >= threshold_roi).collect();
        selected.sort_by(|a, b| b.roi.total_cmp(&a.roi));
        selected
    }

    fn render_csv(&self, deals: &[&ArbitrageDeal]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for deal in deals {
            writer.serialize(DealRow {
                id: &deal.id,
                category: &deal.category,
                title: &deal.source.title,
                condition: deal.source.condition.label(),
                source_price: deal.source.price,
                reference_price: deal.reference.price,
                profit: deal.profit,
                profit_after_fees: deal.profit_after_fees,
                roi: deal.roi,
                source_url: &deal.source.url,
                reference_url: &deal.reference.url,
                research_url: self.links.research_url(&deal.source.title),
            })?;
        }
        writer
            .into_inner()
            .map_err(|e| crate::utils::error::ScanError::ReportError {
                message: format!("failed to flush CSV: {}", e),
            })
    }

    fn render_html(
        &self,
        deals: &[&ArbitrageDeal],
        threshold_roi: f64,
        per_source: &[SourceStats],
        stats: &ScanStats,
    ) -> String {
        let mut html = String::new();
        let _ = write!(
            html,
            "<html><head><meta charset=\"utf-8\"><title>Arbitrage digest</title></head><body>\
             <h1>{} deals with ROI &ge; {:.0}%</h1>\
             <p>Priced: {} &middot; Fallback only: {} &middot; Skipped for time: {}</p>",
            deals.len(),
            threshold_roi,
            stats.items_with_price_result,
            stats.items_fallback_only,
            stats.items_skipped_for_timeout
        );

        html.push_str(
            "<table border=\"1\" cellpadding=\"4\"><tr><th>Item</th><th>Category</th>\
             <th>Price</th><th>Reference</th><th>Profit after fees</th><th>ROI</th><th>Links</th></tr>",
        );
        for deal in deals {
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{:.2} &euro;</td><td>{:.2} &euro;</td>\
                 <td>{:.2} &euro;</td><td>{:.0}%</td>\
                 <td><a href=\"{}\">Listing</a> | <a href=\"{}\">Reference</a> | <a href=\"{}\">Sold</a></td></tr>",
                escape_html(&deal.source.title),
                escape_html(&deal.category),
                deal.source.price,
                deal.reference.price,
                deal.profit_after_fees,
                deal.roi,
                escape_html(&deal.source.url),
                escape_html(&deal.reference.url),
                escape_html(&self.links.research_url(&deal.source.title)),
            );
        }
        html.push_str("</table><h2>Sources</h2><ul>");

        for source in per_source {
            let _ = write!(
                html,
                "<li>{} ({}): {} pages, {} items, {} priced, {} rate limited{}</li>",
                escape_html(&source.name),
                escape_html(&source.category),
                source.pages_scraped,
                source.items_scraped,
                source.with_price_result,
                source.rate_limit_errors,
                source
                    .error
                    .as_deref()
                    .map(|e| format!(" &mdash; failed: {}", escape_html(e)))
                    .unwrap_or_default()
            );
        }
        html.push_str("</ul></body></html>");
        html
    }

    async fn write_digest(
        &self,
        deals: &[&ArbitrageDeal],
        threshold_roi: f64,
        per_source: &[SourceStats],
        stats: &ScanStats,
    ) -> Result<()> {
        let csv = self.render_csv(deals)?;
        self.storage.write_file(CSV_FILENAME, &csv).await?;

        let html = self.render_html(deals, threshold_roi, per_source, stats);
        self.storage.write_file(HTML_FILENAME, html.as_bytes()).await?;
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl<S: Storage> DealReporter for DigestReporter<S> {
    async fn report(
        &self,
        deals: &[ArbitrageDeal],
        threshold_roi: f64,
        per_source: &[SourceStats],
        stats: &ScanStats,
    ) -> ReportOutcome {
        let selected = Self::select_deals(deals, threshold_roi);
        if selected.is_empty() {
            tracing::info!("📭 No deals reached ROI {:.0}%, digest skipped", threshold_roi);
            return ReportOutcome {
                success: true,
                message: format!("No deals with ROI >= {:.0}%", threshold_roi),
                filtered_count: 0,
            };
        }

        match self.write_digest(&selected, threshold_roi, per_source, stats).await {
            Ok(()) => {
                tracing::info!("📬 Digest written with {} deals", selected.len());
                ReportOutcome {
                    success: true,
                    message: format!("Digest written with {} deals", selected.len()),
                    filtered_count: selected.len(),
                }
            }
            Err(e) => {
                tracing::error!("❌ Failed to write digest: {}", e);
                ReportOutcome {
                    success: false,
                    message: e.user_friendly_message(),
                    filtered_count: selected.len(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use crate::domain::model::{Condition, ListingRecord, PriceLookupResult, PLACEHOLDER_IMAGE};
    use chrono::Utc;
    use tempfile::TempDir;

    fn deal(id: &str, title: &str, source_price: f64, reference_price: f64) -> ArbitrageDeal {
        ArbitrageDeal::new(
            id.to_string(),
            "Manga".to_string(),
            ListingRecord {
                title: title.to_string(),
                price: source_price,
                url: format!("https://www.vinted.de/items/{}", id),
                image_url: PLACEHOLDER_IMAGE.to_string(),
                condition: Condition::Good,
                language: None,
            },
            PriceLookupResult {
                price: reference_price,
                url: "https://www.ebay.de/itm/1".to_string(),
                title: title.to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_select_deals_filters_and_sorts_by_roi() {
        let deals = vec![
            deal("1", "Low", 20.0, 30.0),
            deal("2", "High", 10.0, 50.0),
            deal("3", "Mid", 20.0, 50.0),
        ];
        let selected = DigestReporter::<LocalStorage>::select_deals(&deals, 150.0);
        let ids: Vec<&str> = selected.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_report_writes_csv_and_html() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_string_lossy().to_string());
        let reporter = DigestReporter::new(storage, SearchLinks::default());

        let deals = vec![
            deal("a", "One Piece <Band 1>", 10.0, 40.0),
            deal("b", "Cheap", 10.0, 12.0),
        ];
        let stats = ScanStats {
            items_with_price_result: 2,
            ..ScanStats::default()
        };
        let per_source = vec![SourceStats {
            name: "Manga".to_string(),
            category: "Books".to_string(),
            pages_scraped: 1,
            items_scraped: 2,
            ..SourceStats::default()
        }];

        let outcome = reporter.report(&deals, 150.0, &per_source, &stats).await;
        assert!(outcome.success);
        assert_eq!(outcome.filtered_count, 1);

        let csv = std::fs::read_to_string(dir.path().join(CSV_FILENAME)).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,category,title"));
        assert!(lines.next().unwrap().starts_with("a,Manga,One Piece <Band 1>"));
        assert!(lines.next().is_none());

        let html = std::fs::read_to_string(dir.path().join(HTML_FILENAME)).unwrap();
        assert!(html.contains("One Piece &lt;Band 1&gt;"));
        assert!(html.contains("tabName=SOLD"));
    }

    #[tokio::test]
    async fn test_report_without_qualifying_deals_skips_output() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_string_lossy().to_string());
        let reporter = DigestReporter::new(storage, SearchLinks::default());

        let outcome = reporter
            .report(&[deal("a", "Cheap", 10.0, 11.0)], 150.0, &[], &ScanStats::default())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.filtered_count, 0);
        assert!(!dir.path().join(CSV_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"file, not a directory").unwrap();
        let storage = LocalStorage::new(blocker.to_string_lossy().to_string());
        let reporter = DigestReporter::new(storage, SearchLinks::default());

        let outcome = reporter
            .report(&[deal("a", "Zelda", 10.0, 40.0)], 150.0, &[], &ScanStats::default())
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.filtered_count, 1);
    }
}
