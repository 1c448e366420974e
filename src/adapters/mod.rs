// Adapters: HTTP catalog fetcher, reference marketplace client, digest output.

pub mod ebay;
pub mod fetcher;
pub mod reporter;
pub mod token;

pub use ebay::{EbayBrowseClient, EbayCredentials, EbaySettings, SearchLinks};
pub use fetcher::{FetcherSettings, HttpPageFetcher};
pub use reporter::DigestReporter;
pub use token::TokenCache;
