use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Placeholder substituted with the 1-based page number in the URL template
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Number of records the upstream listing returns per page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const DEFAULT_URL_TEMPLATE: &str = "https://push2.eastmoney.com/api/qt/clist/get?\
np=1&fltt=1&invt=2&cb=jQuery37105849300946593018_1760442054336&\
fs=m:128+t:3,m:128+t:4,m:128+t:1,m:128+t:2&\
fields=f12,f13,f14,f19,f1,f2,f4,f3,f152,f17,f18,f15,f16,f5,f6&\
fid=f3&pn={page}&pz=20&po=1&dect=1&ut=fa5fd1943c7b386f172d6893dbfba10b&\
wbp2u=|0|0|0|web&_=1760442054387";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Main configuration structure for Quote-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Overrides of upstream field codes, keyed by field name
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Upstream listing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Listing URL with a `{page}` placeholder
    #[serde(rename = "url-template", default = "default_url_template")]
    pub url_template: String,

    /// Records per page; must agree with the template's `pz` parameter
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Crawl pipeline behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of page fetches in flight at once
    #[serde(rename = "max-concurrent-fetches", default = "default_concurrency")]
    pub max_concurrent_fetches: u32,

    /// Attempts per page before the page is given up
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff step; the delay after attempt N is N times this (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Soft bound on waiting for all page tasks (seconds)
    #[serde(rename = "overall-timeout-secs", default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,

    /// Ceiling on the planned page count, whatever total the upstream reports
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Interval between crawls in watch mode (minutes)
    #[serde(rename = "watch-interval-mins", default = "default_watch_interval")]
    pub watch_interval_mins: u64,
}

/// HTTP connection handling
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(rename = "response-timeout-secs", default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    /// Bound on waiting for a free connection slot
    #[serde(rename = "pool-acquire-timeout-secs", default = "default_acquire_timeout")]
    pub pool_acquire_timeout_secs: u64,

    /// Bound on connections in use at once, enforced by the fetcher
    #[serde(rename = "max-connections", default = "default_max_connections")]
    pub max_connections: u32,

    /// Idle connections kept open per host between requests
    #[serde(rename = "max-idle-per-host", default = "default_max_idle_per_host")]
    pub max_idle_per_host: u32,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Rows older than this many days are removed by a purge
    #[serde(rename = "retention-days", default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(rename = "purge-after-crawl", default)]
    pub purge_after_crawl: bool,
}

impl CrawlerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_mins * 60)
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_acquire_timeout_secs)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            page_size: default_page_size(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_backoff_ms(),
            overall_timeout_secs: default_overall_timeout(),
            max_pages: default_max_pages(),
            watch_interval_mins: default_watch_interval(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            response_timeout_secs: default_response_timeout(),
            pool_acquire_timeout_secs: default_acquire_timeout(),
            max_connections: default_max_connections(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            retention_days: default_retention_days(),
            purge_after_crawl: false,
        }
    }
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_concurrency() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_overall_timeout() -> u64 {
    30 * 60
}

fn default_max_pages() -> u32 {
    1000
}

fn default_watch_interval() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_response_timeout() -> u64 {
    15
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_max_connections() -> u32 {
    20
}

fn default_max_idle_per_host() -> u32 {
    10
}

fn default_database_path() -> String {
    "./quotes.db".to_string()
}

fn default_retention_days() -> u32 {
    30
}
