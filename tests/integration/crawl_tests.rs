//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the listing endpoint and run
//! the full fetch, normalize and persist cycle against a temporary database.

use quote_harvest::config::{parse_config, Config};
use quote_harvest::crawler::{harvest, CrawlMode};
use quote_harvest::state::PageState;
use quote_harvest::storage::{QuoteStore, RunStatus, SqliteStorage};
use rust_decimal::Decimal;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_PATH: &str = "/api/qt/clist/get";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server_uri: &str, db_path: &Path) -> Config {
    let toml = format!(
        r#"
[endpoint]
url-template = "{uri}{path}?pn={{page}}&pz=20&po=1&fs=m:0+t:6&fields=f2,f3,f4,f5,f6,f12,f13,f14,f15,f16,f17&wbp2u=|0|0|0|web"
user-agent = "QuoteHarvestTest/1.0"

[crawler]
max-concurrent-fetches = 3
max-attempts = 3
retry-backoff-ms = 10
overall-timeout-secs = 30

[http]
connect-timeout-secs = 2
response-timeout-secs = 5

[storage]
database-path = "{db}"
"#,
        uri = server_uri,
        path = LISTING_PATH,
        db = db_path.display()
    );

    parse_config(&toml).expect("test config should be valid")
}

/// A JSONP listing body with one row per `(code, name)` pair
fn listing_body(total: u64, rows: &[(&str, &str)]) -> String {
    let diff: Vec<String> = rows
        .iter()
        .map(|(code, name)| {
            format!(
                r#"{{"f2":"12.34","f3":"256","f4":"0.31","f5":"15","f6":"18522.5","f12":"{}","f13":"0","f14":"{}","f15":"12.50","f16":"12.00","f17":"11.90"}}"#,
                code, name
            )
        })
        .collect();

    format!(
        r#"jQuery112406({{"rc":0,"rt":6,"svr":181734976,"data":{{"total":{},"diff":[{}]}}}});"#,
        total,
        diff.join(",")
    )
}

async fn mount_page(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("pn", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_single_page_crawl() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("quotes.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    mount_page(
        &mock_server,
        3,
        listing_body(500, &[("600519", "Moutai"), ("000001", "Ping An Bank")]),
    )
    .await;

    let report = harvest(&config, "test-hash", CrawlMode::SinglePage(3), CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.pages_planned, 1);
    assert_eq!(report.page_states.get(&3), Some(&PageState::Completed));
    assert_eq!(report.persisted.saved, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let history = storage.find_by_code("600519", 10).unwrap();
    assert_eq!(history.len(), 1);

    let quote = &history[0].quote;
    assert_eq!(quote.name, "Moutai");
    assert_eq!(quote.current_price, Some(Decimal::new(1234, 2)));
    assert_eq!(quote.change_percent, Some(Decimal::new(256, 4)));
    assert_eq!(quote.volume, 150_000);
    assert_eq!(quote.turnover, Some(Decimal::new(185_225_000, 0)));
    assert_eq!(quote.high_price, Some(Decimal::new(1250, 2)));
    assert_eq!(quote.open_price, Some(Decimal::new(1200, 2)));
    assert_eq!(quote.low_price, Some(Decimal::new(1190, 2)));

    let run = storage.get_latest_run().unwrap().expect("run should be recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.mode, "single-page");
    assert_eq!(run.config_hash, "test-hash");
}

#[tokio::test]
async fn test_full_crawl_tolerates_missing_envelope() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("quotes.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    mount_page(&mock_server, 1, listing_body(45, &[("000001", "Alpha"), ("000002", "Beta")])).await;
    mount_page(
        &mock_server,
        2,
        "<html><body>Service temporarily busy</body></html>".to_string(),
    )
    .await;
    mount_page(&mock_server, 3, listing_body(45, &[("000041", "Gamma")])).await;

    let report = harvest(&config, "h", CrawlMode::AllPages, CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.pages_planned, 3);
    assert_eq!(report.pages_succeeded(), 3);
    assert_eq!(report.records_parsed, 3);
    assert_eq!(report.persisted.saved, 3);
    assert_eq!(report.pages_without_payload, 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_quotes().unwrap(), 3);
    let codes: Vec<String> = storage
        .find_all_codes()
        .unwrap()
        .into_iter()
        .map(|listing| listing.code)
        .collect();
    assert_eq!(codes, vec!["000001", "000002", "000041"]);

    // Page 1 is fetched once and reused for planning
    let page_one_requests = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.query_pairs().any(|(k, v)| k == "pn" && v == "1"))
        .count();
    assert_eq!(page_one_requests, 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("quotes.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("pn", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 1, listing_body(3, &[("300750", "CATL")])).await;

    let report = harvest(&config, "h", CrawlMode::AllPages, CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.pages_planned, 1);
    assert_eq!(report.persisted.saved, 1);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("quotes.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let report = harvest(&config, "h", CrawlMode::SinglePage(1), CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.pages_failed(), 1);
    assert_eq!(report.persisted.saved, 0);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.totals.pages_failed, 1);
}

#[tokio::test]
async fn test_query_pipes_are_percent_encoded() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("quotes.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    mount_page(&mock_server, 1, listing_body(1, &[("688981", "SMIC")])).await;

    harvest(&config, "h", CrawlMode::SinglePage(1), CancellationToken::new())
        .await
        .expect("Crawl failed");

    let requests = mock_server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap_or_default().to_string();
    assert!(
        query.contains("wbp2u=%7C0%7C0%7C0%7Cweb"),
        "unexpected query: {}",
        query
    );
    assert!(!query.contains('|'));
}

#[tokio::test]
async fn test_invalid_rows_are_dropped() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("quotes.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    let rows = [
        r#"{"f12":"000001","f14":"Alpha","f2":"-","f3":"-","f5":"-","f13":"1"}"#,
        r#"{"f12":"-","f14":"No Code"}"#,
        r#"{"f12":"000003","f14":"-"}"#,
    ];
    let body = format!(r#"cb({{"rc":0,"data":{{"total":3,"diff":[{}]}}}});"#, rows.join(","));
    mount_page(&mock_server, 1, body).await;

    let report = harvest(&config, "h", CrawlMode::AllPages, CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.records_parsed, 1);
    assert_eq!(report.records_dropped, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let history = storage.find_by_code("000001", 10).unwrap();
    let quote = &history[0].quote;
    assert_eq!(quote.current_price, None);
    assert_eq!(quote.change_percent, None);
    assert_eq!(quote.volume, 0);
    assert_eq!(quote.turnover, Some(Decimal::ZERO));
    assert_eq!(quote.market, 1);
}
