use crate::config::types::{
    Config, CrawlerConfig, EndpointConfig, HttpConfig, StorageConfig, PAGE_PLACEHOLDER,
};
use crate::quote::FieldMap;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_endpoint_config(&config.endpoint)?;
    validate_crawler_config(&config.crawler)?;
    validate_http_config(&config.http)?;
    validate_storage_config(&config.storage)?;

    let field_map = FieldMap::with_overrides(&config.fields)?;
    field_map.verify_template(&config.endpoint.url_template)?;

    Ok(())
}

/// Validates the listing endpoint configuration
fn validate_endpoint_config(config: &EndpointConfig) -> Result<(), ConfigError> {
    if !config.url_template.contains(PAGE_PLACEHOLDER) {
        return Err(ConfigError::Validation(format!(
            "url_template must contain the {} placeholder",
            PAGE_PLACEHOLDER
        )));
    }

    let url = Url::parse(&config.url_template.replace(PAGE_PLACEHOLDER, "1"))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid url_template: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "url_template must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.page_size < 1 || config.page_size > 500 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 500, got {}",
            config.page_size
        )));
    }

    // The planner divides by page_size, so it has to match what the endpoint serves
    if let Some((_, pz)) = url.query_pairs().find(|(key, _)| key == "pz") {
        if pz.parse::<u32>().ok() != Some(config.page_size) {
            return Err(ConfigError::Validation(format!(
                "page_size {} does not match the template's pz={}",
                config.page_size, pz
            )));
        }
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.overall_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "overall_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 || config.max_pages > 100_000 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and 100000, got {}",
            config.max_pages
        )));
    }

    if config.watch_interval_mins < 1 {
        return Err(ConfigError::Validation(
            "watch_interval_mins must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates HTTP connection settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("connect_timeout_secs", config.connect_timeout_secs),
        ("response_timeout_secs", config.response_timeout_secs),
        ("pool_acquire_timeout_secs", config.pool_acquire_timeout_secs),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    if config.max_connections < 1 {
        return Err(ConfigError::Validation(format!(
            "max_connections must be >= 1, got {}",
            config.max_connections
        )));
    }

    if config.max_idle_per_host > config.max_connections {
        return Err(ConfigError::Validation(format!(
            "max_idle_per_host ({}) must be <= max_connections ({})",
            config.max_idle_per_host, config.max_connections
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.retention_days < 1 {
        return Err(ConfigError::Validation(format!(
            "retention_days must be >= 1, got {}",
            config.retention_days
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_template_requires_placeholder() {
        let mut config = Config::default();
        config.endpoint.url_template = "https://quotes.example.com/list?pn=1".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_template_rejects_other_schemes() {
        let mut config = Config::default();
        config.endpoint.url_template = "ftp://quotes.example.com/list?pn={page}".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_page_size_must_match_template() {
        let mut config = Config::default();
        config.endpoint.page_size = 50;
        assert!(validate(&config).is_err());

        config.endpoint.url_template = "https://quotes.example.com/list?pn={page}".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_crawler_bounds() {
        let mut config = Config::default();
        config.crawler.max_concurrent_fetches = 101;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.crawler.max_attempts = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.crawler.max_pages = 0;
        assert!(validate(&config).is_err());
        config.crawler.max_pages = 100_001;
        assert!(validate(&config).is_err());
        config.crawler.max_pages = 100_000;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_connection_limits() {
        let mut config = Config::default();
        config.http.max_connections = 4;
        config.http.max_idle_per_host = 10;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.http.max_connections = 0;
        config.http.max_idle_per_host = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.http.pool_acquire_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_storage_settings() {
        let mut config = Config::default();
        config.storage.database_path.clear();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.storage.retention_days = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_field_override_missing_from_template() {
        let mut config = Config::default();
        config.fields.insert("name".to_string(), "f58".to_string());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::FieldMapping(_))
        ));
    }
}
