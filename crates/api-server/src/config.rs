use std::path::PathBuf;
use std::time::Duration;

use price_client::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("BASE_URL_FOR_REPORTS is required when IS_LOCAL_DEVELOPMENT is not set")]
    MissingBaseUrl,
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Server settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub reports_dir: PathBuf,
    pub is_local_development: bool,
    pub base_url_for_reports: Option<String>,
    pub max_concurrent_per_ip: usize,
    pub max_concurrent_global: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            reports_dir: PathBuf::from("static/reports"),
            is_local_development: true,
            base_url_for_reports: None,
            max_concurrent_per_ip: 3,
            max_concurrent_global: 6,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(180),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse_num("PORT", port)?;
        }
        if let Some(dir) = lookup("REPORTS_DIR") {
            config.reports_dir = PathBuf::from(dir);
        }
        config.base_url_for_reports = lookup("BASE_URL_FOR_REPORTS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        match lookup("IS_LOCAL_DEVELOPMENT") {
            Some(flag) => config.is_local_development = parse_flag(&flag),
            None if config.base_url_for_reports.is_none() => {
                tracing::warn!("neither IS_LOCAL_DEVELOPMENT nor BASE_URL_FOR_REPORTS set, assuming local development");
            }
            None => config.is_local_development = false,
        }
        if let Some(v) = lookup("MAX_CONCURRENT_PER_IP") {
            config.max_concurrent_per_ip = parse_num("MAX_CONCURRENT_PER_IP", v)?;
        }
        if let Some(v) = lookup("MAX_CONCURRENT_GLOBAL") {
            config.max_concurrent_global = parse_num("MAX_CONCURRENT_GLOBAL", v)?;
        }
        if let Some(v) = lookup("PRICE_FETCH_MAX_RETRIES") {
            config.retry.max_attempts = parse_num("PRICE_FETCH_MAX_RETRIES", v)?;
        }
        if let Some(v) = lookup("PRICE_FETCH_INITIAL_BACKOFF_SECS") {
            config.retry.initial_backoff =
                Duration::from_secs(parse_num("PRICE_FETCH_INITIAL_BACKOFF_SECS", v)?);
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_num("REQUEST_TIMEOUT_SECS", v)?);
        }

        if !config.is_local_development && config.base_url_for_reports.is_none() {
            tracing::error!("BASE_URL_FOR_REPORTS is required outside local development");
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            reports_dir = %config.reports_dir.display(),
            local = config.is_local_development,
            per_ip = config.max_concurrent_per_ip,
            global = config.max_concurrent_global,
            timeout_secs = config.request_timeout.as_secs(),
            "server config loaded"
        );
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public URL of a file written to `reports_dir`.
    pub fn report_url(&self, filename: &str) -> Result<String, ConfigError> {
        if self.is_local_development {
            return Ok(format!("/static/reports/{}", filename));
        }
        let base = self
            .base_url_for_reports
            .as_deref()
            .ok_or(ConfigError::MissingBaseUrl)?;
        Ok(format!("{}/static/reports/{}", base.trim_end_matches('/'), filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_concurrent_per_ip, 3);
        assert_eq!(config.max_concurrent_global, 6);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(180));
        assert_eq!(
            config.report_url("r.html").unwrap(),
            "/static/reports/r.html"
        );
    }

    #[test]
    fn test_remote_requires_base_url() {
        let config =
            ServerConfig::from_lookup(lookup(&[("IS_LOCAL_DEVELOPMENT", "false")])).unwrap();
        assert!(matches!(
            config.report_url("r.html"),
            Err(ConfigError::MissingBaseUrl)
        ));

        let config =
            ServerConfig::from_lookup(lookup(&[("BASE_URL_FOR_REPORTS", "https://x.test")]))
                .unwrap();
        assert!(!config.is_local_development);

        let config = ServerConfig::from_lookup(lookup(&[
            ("IS_LOCAL_DEVELOPMENT", "0"),
            ("BASE_URL_FOR_REPORTS", "https://reports.example.com/"),
        ]))
        .unwrap();
        assert_eq!(
            config.report_url("r.csv").unwrap(),
            "https://reports.example.com/static/reports/r.csv"
        );
    }

    #[test]
    fn test_invalid_number() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
    }
}
