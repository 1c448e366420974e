pub mod budget;
pub mod extractor;
pub mod scanner;
pub mod walker;

pub use crate::domain::model::{ArbitrageDeal, ListingRecord, ScanReport, ScanStats};
pub use crate::domain::ports::{Clock, DealReporter, PageFetcher, PriceLookup, Storage};
pub use crate::utils::error::Result;
