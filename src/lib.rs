pub mod config;
pub mod detail_page;
pub mod error;
pub mod listing_page;
pub mod models;
pub mod parser;
pub mod reconcile;
pub mod scraper;
pub mod transport;
pub mod utils;
