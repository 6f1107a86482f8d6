//! lbcscan: client for the Piloterr scraping API and Leboncoin category discovery.

pub mod api;
pub mod cli;
pub mod config;
pub mod export;
pub mod logging;
pub mod model;
pub mod page;
pub mod query;
pub mod scan;

// Re-exports for CLI and consumers.
pub use api::{ApiClient, ApiClientBuilder, ApiError, RawResponse, SearchApi};
pub use export::{render_table, write_csv, write_json, ExportError, ExportFormat};
pub use model::{Ad, Category};
pub use page::is_404_page;
pub use query::SearchQuery;
pub use scan::{scan_categories, Aggregation, ScanOptions, Scanner};
