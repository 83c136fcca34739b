use crate::pipeline::PipelineOptions;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub enrichment_base_url: String,
    pub opportunity_base_url: String,
    pub decision_service_url: Option<String>, // Rule-based delegate when absent
    pub provider_api_key: Option<String>,
    pub decision_tables_path: Option<PathBuf>,
    pub stage_timeout: Duration,
    pub concurrent_enrichment: bool,
    pub strict_scoring: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_source<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            enrichment_base_url: non_empty("ENRICHMENT_BASE_URL")
                .ok_or_else(|| anyhow::anyhow!("ENRICHMENT_BASE_URL environment variable required"))
                .and_then(|url| http_url("ENRICHMENT_BASE_URL", url))?,
            opportunity_base_url: non_empty("OPPORTUNITY_BASE_URL")
                .ok_or_else(|| {
                    anyhow::anyhow!("OPPORTUNITY_BASE_URL environment variable required")
                })
                .and_then(|url| http_url("OPPORTUNITY_BASE_URL", url))?,
            decision_service_url: non_empty("DECISION_SERVICE_URL")
                .map(|url| http_url("DECISION_SERVICE_URL", url))
                .transpose()?,
            provider_api_key: non_empty("PROVIDER_API_KEY"),
            decision_tables_path: non_empty("DECISION_TABLES_PATH").map(PathBuf::from),
            stage_timeout: match non_empty("STAGE_TIMEOUT_SECS") {
                Some(raw) => {
                    let secs: u64 = raw.trim().parse().map_err(|_| {
                        anyhow::anyhow!("STAGE_TIMEOUT_SECS must be a whole number of seconds")
                    })?;
                    if secs == 0 {
                        anyhow::bail!("STAGE_TIMEOUT_SECS must be greater than 0");
                    }
                    Duration::from_secs(secs)
                }
                None => Duration::from_secs(30),
            },
            concurrent_enrichment: flag("CONCURRENT_ENRICHMENT", non_empty("CONCURRENT_ENRICHMENT"))?,
            strict_scoring: flag("STRICT_SCORING", non_empty("STRICT_SCORING"))?,
        };

        tracing::debug!(
            "Configuration loaded (decision service: {}, tables: {})",
            config.decision_service_url.as_deref().unwrap_or("rule-based"),
            config
                .decision_tables_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".to_string())
        );

        Ok(config)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            stage_timeout: self.stage_timeout,
            concurrent_enrichment: self.concurrent_enrichment,
            strict_scoring: self.strict_scoring,
        }
    }
}

fn http_url(key: &str, raw: String) -> anyhow::Result<String> {
    let url = url::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", key, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

fn flag(key: &str, raw: Option<String>) -> anyhow::Result<bool> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("{} must be true or false, got '{}'", key, other),
    }
}
