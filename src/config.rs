// =============================================================================
// config.rs — THE KNOBS
// =============================================================================
//
// Everything here can be overridden with a PASTE_RECON_* environment variable
// (or a .env file, for the people who like files). Defaults work out of the
// box against the public psbdmp API.
//
// One thing you will NOT find in here: the rate limit. psbdmp gets one query
// pipeline every three seconds from us, and that number lives next to the
// connector that honours it.
// =============================================================================

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

/// All tunable parameters of the engine.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // REMOTE API
    // =========================================================================

    /// Base URL of the paste-dump search API. The connector appends
    /// `/api/search/{domain}` and `/api/dump/get/{id}` to it.
    /// Default: https://psbdmp.ws
    pub api_base_url: String,

    /// Timeout of the HTTP client used by the page fetcher. The connector
    /// itself layers nothing on top of this.
    pub http_timeout: Duration,

    /// User-Agent sent with every request.
    pub user_agent: String,

    // =========================================================================
    // SCOPE
    // =========================================================================

    /// Root domains we are allowed to ask about and report on.
    /// Comma separated in PASTE_RECON_DOMAINS.
    pub scope_domains: Vec<String>,

    // =========================================================================
    // CHANNELS
    // =========================================================================

    /// Capacity of each of the four inbound request queues.
    pub request_channel_capacity: usize,

    /// Capacity of each outbound bus topic.
    pub bus_capacity: usize,

    // =========================================================================
    // RELAY
    // =========================================================================

    /// Redis connection URL. When unset, events are written to stdout as
    /// JSON lines instead.
    pub redis_url: Option<String>,

    /// Redis pub/sub channel that receives discovered names.
    pub redis_names_channel: String,

    /// Redis pub/sub channel that receives log lines.
    pub redis_log_channel: String,

    // =========================================================================
    // METRICS
    // =========================================================================

    /// Port of the JSON metrics endpoint.
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults for
    /// anything missing or unparsable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Config {
            api_base_url: env_or_default("PASTE_RECON_API_BASE_URL", "https://psbdmp.ws")
                .trim_end_matches('/')
                .to_string(),
            http_timeout: Duration::from_secs(
                env_or_default("PASTE_RECON_HTTP_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            ),
            user_agent: env_or_default(
                "PASTE_RECON_USER_AGENT",
                "PasteReconEngine/0.1 (passive-recon; +https://psbdmp.ws)",
            ),

            scope_domains: parse_domain_list(&env_or_default("PASTE_RECON_DOMAINS", "")),

            request_channel_capacity: env_or_default("PASTE_RECON_REQUEST_CAPACITY", "1000")
                .parse()
                .unwrap_or(1000),
            bus_capacity: env_or_default("PASTE_RECON_BUS_CAPACITY", "10000")
                .parse()
                .unwrap_or(10_000),

            redis_url: env::var("PASTE_RECON_REDIS_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            redis_names_channel: env_or_default("PASTE_RECON_REDIS_NAMES_CHANNEL", "recon:names"),
            redis_log_channel: env_or_default("PASTE_RECON_REDIS_LOG_CHANNEL", "recon:log"),

            metrics_port: env_or_default("PASTE_RECON_METRICS_PORT", "9090")
                .parse()
                .unwrap_or(9090),
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid API base URL: {}", self.api_base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("API base URL must be http or https, got {}", base.scheme());
        }
        if self.request_channel_capacity == 0 || self.bus_capacity == 0 {
            bail!("channel capacities must be greater than zero");
        }
        Ok(())
    }
}

/// Split a comma separated domain list into normalised root domains.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for domain in raw.split(',').map(|d| d.trim().trim_end_matches('.').to_lowercase()) {
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            api_base_url: "https://psbdmp.ws".to_string(),
            http_timeout: Duration::from_secs(30),
            user_agent: "test".to_string(),
            scope_domains: vec!["example.com".to_string()],
            request_channel_capacity: 10,
            bus_capacity: 10,
            redis_url: None,
            redis_names_channel: "recon:names".to_string(),
            redis_log_channel: "recon:log".to_string(),
            metrics_port: 9090,
        }
    }

    #[test]
    fn test_domain_list_is_normalised() {
        let domains = parse_domain_list(" Example.COM., ,owasp.org ,");
        assert_eq!(domains, vec!["example.com".to_string(), "owasp.org".to_string()]);
    }

    #[test]
    fn test_empty_domain_list() {
        assert!(parse_domain_list("").is_empty());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let mut config = sample();
        config.api_base_url = "ftp://psbdmp.ws".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = sample();
        config.bus_capacity = 0;
        assert!(config.validate().is_err());
    }
}
