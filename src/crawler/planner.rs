//! Page count planning from the first listing response

use crate::crawler::extractor::extract_payload;
use serde_json::Value;
use std::ops::RangeInclusive;

/// How many pages a full crawl covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlPlan {
    pub total_pages: u32,
    pub page_size: u32,
    /// Record total reported upstream, when it could be read
    pub total_records: Option<u64>,
}

impl CrawlPlan {
    /// The fallback plan: just the first page
    pub fn single(page_size: u32) -> Self {
        Self {
            total_pages: 1,
            page_size,
            total_records: None,
        }
    }

    /// Clamps the page count to `max_pages`
    pub fn capped(self, max_pages: u32) -> Self {
        let max_pages = max_pages.max(1);
        if self.total_pages <= max_pages {
            return self;
        }

        tracing::warn!(
            "Listing reports {} pages ({:?} records), crawling only the first {}",
            self.total_pages,
            self.total_records,
            max_pages
        );
        Self {
            total_pages: max_pages,
            ..self
        }
    }

    pub fn pages(&self) -> RangeInclusive<u32> {
        1..=self.total_pages
    }
}

/// `ceil(total / page_size)`, never less than one
pub fn pages_for_total(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Plans a crawl from the body of page 1
///
/// Any failure to read `data.total` falls back to a single page.
pub fn plan_pages(first_page_body: &str, page_size: u32) -> CrawlPlan {
    let Some(payload) = extract_payload(first_page_body) else {
        tracing::warn!("Could not read listing total from first page, crawling 1 page");
        return CrawlPlan::single(page_size);
    };

    match read_total(&payload) {
        Some(total) => CrawlPlan {
            total_pages: pages_for_total(total, page_size),
            page_size,
            total_records: Some(total),
        },
        None => {
            tracing::warn!("Listing payload has no usable data.total, crawling 1 page");
            CrawlPlan::single(page_size)
        }
    }
}

/// `data.total` as a count; negative totals read as zero
fn read_total(payload: &Value) -> Option<u64> {
    match payload.pointer("/data/total")? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|_| 0))
            .or_else(|| n.as_f64().map(|f| f.max(0.0).ceil() as u64)),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|t| t.max(0) as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with_total(total: &str) -> String {
        format!(r#"cb({{"rc":0,"data":{{"total":{},"diff":[]}}}});"#, total)
    }

    #[test]
    fn test_pages_for_total() {
        assert_eq!(pages_for_total(45, 20), 3);
        assert_eq!(pages_for_total(40, 20), 2);
        assert_eq!(pages_for_total(1, 20), 1);
        assert_eq!(pages_for_total(0, 20), 1);
        assert_eq!(pages_for_total(5000, 20), 250);
    }

    #[test]
    fn test_plan_from_total() {
        let plan = plan_pages(&body_with_total("45"), 20);
        assert_eq!(plan.total_pages, 3);
        assert_eq!(plan.total_records, Some(45));
        assert_eq!(plan.pages(), 1..=3);
    }

    #[test]
    fn test_plan_zero_and_negative_totals() {
        assert_eq!(plan_pages(&body_with_total("0"), 20).total_pages, 1);
        assert_eq!(plan_pages(&body_with_total("-7"), 20).total_pages, 1);
    }

    #[test]
    fn test_plan_string_total() {
        assert_eq!(plan_pages(&body_with_total(r#""61""#), 20).total_pages, 4);
    }

    #[test]
    fn test_huge_total_is_capped() {
        let plan = plan_pages(&body_with_total("1000000000000"), 20);
        assert_eq!(plan.total_records, Some(1_000_000_000_000));

        let plan = plan.capped(1000);
        assert_eq!(plan.total_pages, 1000);
        assert_eq!(plan.pages().count(), 1000);
        assert_eq!(plan.total_records, Some(1_000_000_000_000));
    }

    #[test]
    fn test_cap_leaves_small_plans_alone() {
        let plan = plan_pages(&body_with_total("45"), 20).capped(1000);
        assert_eq!(plan.total_pages, 3);
        assert_eq!(CrawlPlan::single(20).capped(0).total_pages, 1);
    }

    #[test]
    fn test_plan_malformed_body() {
        let plan = plan_pages("<html>maintenance</html>", 20);
        assert_eq!(plan, CrawlPlan::single(20));
    }

    #[test]
    fn test_plan_missing_total() {
        let plan = plan_pages(r#"cb({"rc":0,"data":{"diff":[]}});"#, 20);
        assert_eq!(plan.total_pages, 1);
        assert_eq!(plan.total_records, None);
    }
}
