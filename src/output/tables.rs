//! Plain-text tables for query results and crawl reports

use crate::crawler::CrawlReport;
use crate::quote::{Listing, StoredQuote};
use rust_decimal::Decimal;

/// Renders an optional decimal, with `-` for missing values
pub fn format_decimal(value: Option<Decimal>) -> String {
    match value {
        Some(v) => v.normalize().to_string(),
        None => "-".to_string(),
    }
}

/// Renders a change percent with a sign and two decimals
pub fn format_percent(value: Option<Decimal>) -> String {
    match value {
        Some(v) if v > Decimal::ZERO => format!("+{:.2}%", v.round_dp(2)),
        Some(v) => format!("{:.2}%", v.round_dp(2)),
        None => "-".to_string(),
    }
}

/// Prints latest quotes, one row per code
pub fn print_quotes(quotes: &[StoredQuote]) {
    if quotes.is_empty() {
        println!("No quotes stored");
        return;
    }

    println!(
        "{:<8} {:<12} {:>10} {:>10} {:>10} {:>14}",
        "Code", "Name", "Price", "Change", "Change %", "Volume"
    );
    for stored in quotes {
        let q = &stored.quote;
        println!(
            "{:<8} {:<12} {:>10} {:>10} {:>10} {:>14}",
            q.code,
            q.name,
            format_decimal(q.current_price),
            format_decimal(q.change_amount),
            format_percent(q.change_percent),
            q.volume
        );
    }
}

/// Prints captured history for one code, newest first
pub fn print_history(code: &str, quotes: &[StoredQuote]) {
    if quotes.is_empty() {
        println!("No history for {}", code);
        return;
    }

    println!("History for {} ({} captures):", code, quotes.len());
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Captured", "Price", "Open", "High", "Low", "Change %"
    );
    for stored in quotes {
        let q = &stored.quote;
        println!(
            "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10}",
            q.trade_time.format("%Y-%m-%d %H:%M:%S"),
            format_decimal(q.current_price),
            format_decimal(q.open_price),
            format_decimal(q.high_price),
            format_decimal(q.low_price),
            format_percent(q.change_percent)
        );
    }
}

/// Prints the distinct code listing
pub fn print_listings(listings: &[Listing]) {
    println!("Known codes ({}):", listings.len());
    for listing in listings {
        println!("  {} {} (market {})", listing.code, listing.name, listing.market);
    }
}

/// Prints the outcome of one crawl invocation
pub fn print_crawl_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");
    if let Some(run_id) = report.run_id {
        println!("Run: #{}", run_id);
    }
    println!("Mode: {}", report.mode);
    println!("Status: {}", report.status().to_db_string());
    println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!();

    println!("Pages:");
    println!("  Planned: {}", report.pages_planned);
    println!("  Succeeded: {}", report.pages_succeeded());
    println!("  Failed: {}", report.pages_failed());
    println!("  Abandoned: {}", report.pages_abandoned());
    if report.pages_without_payload > 0 {
        println!("  Without payload: {}", report.pages_without_payload);
    }
    if report.timed_out {
        println!("  (overall timeout reached)");
    }
    println!();

    println!("Records:");
    println!("  Parsed: {}", report.records_parsed);
    println!("  Dropped: {}", report.records_dropped);
    println!("  Saved: {}", report.persisted.saved);
    println!("  Failed to save: {}", report.persisted.failed);

    let failed: Vec<String> = report
        .page_states
        .iter()
        .filter(|(_, state)| !state.is_success())
        .map(|(page, _)| page.to_string())
        .collect();
    if !failed.is_empty() {
        println!("\nPages without data: {}", failed.join(", "));
    }
}
