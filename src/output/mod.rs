//! Output module for reports and query results
//!
//! This module handles:
//! - Store-wide statistics
//! - Crawl reports
//! - Tables for history, listing and top-mover queries

pub mod stats;
mod tables;

pub use stats::{load_statistics, print_statistics, StoreStatistics};
pub use tables::{
    format_decimal, format_percent, print_crawl_report, print_history, print_listings,
    print_quotes,
};
