use crate::types::{FilterError, Result};
use email_ingestion::GOOGLE_ALERT_SENDER;
use std::env;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://google_alerts.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Bearer token for the completion endpoint; the classifier refuses to start without it
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Total number of attempts per request, the first one included
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 60,
        }
    }
}

impl LlmConfig {
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| FilterError::Config("DEEPSEEK_API_KEY is not set".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImapSettings {
    pub uri: String,
    pub password: String,
    pub sender: String,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub database_url: String,
    pub llm: LlmConfig,
    pub batch: BatchConfig,
    pub imap: Option<ImapSettings>,
}

impl FilterConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source, falling back to defaults for unset values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm_defaults = LlmConfig::default();
        let batch_defaults = BatchConfig::default();

        let llm = LlmConfig {
            api_key: lookup("DEEPSEEK_API_KEY").filter(|key| !key.trim().is_empty()),
            base_url: lookup("LLM_BASE_URL").unwrap_or(llm_defaults.base_url),
            model: lookup("LLM_MODEL").unwrap_or(llm_defaults.model),
            temperature: parse_var(&lookup, "LLM_TEMPERATURE", llm_defaults.temperature)?,
            max_tokens: parse_var(&lookup, "LLM_MAX_TOKENS", llm_defaults.max_tokens)?,
            max_retries: parse_var(&lookup, "LLM_MAX_RETRIES", llm_defaults.max_retries)?,
            retry_delay_ms: parse_var(&lookup, "LLM_RETRY_DELAY_MS", llm_defaults.retry_delay_ms)?,
            timeout_seconds: parse_var(&lookup, "LLM_TIMEOUT_SECS", llm_defaults.timeout_seconds)?,
        };

        let batch = BatchConfig {
            batch_size: parse_var(&lookup, "FILTER_BATCH_SIZE", batch_defaults.batch_size)?,
            inter_batch_delay_ms: parse_var(
                &lookup,
                "FILTER_BATCH_DELAY_MS",
                batch_defaults.inter_batch_delay_ms,
            )?,
        };

        let imap = match (lookup("ALERT_IMAP_URI"), lookup("ALERT_IMAP_PASSWORD")) {
            (Some(uri), Some(password)) => Some(ImapSettings {
                uri,
                password,
                sender: lookup("ALERT_SENDER").unwrap_or_else(|| GOOGLE_ALERT_SENDER.to_string()),
            }),
            _ => None,
        };

        let config = Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            llm,
            batch,
            imap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(FilterError::Config("FILTER_BATCH_SIZE must be at least 1".to_string()));
        }
        if self.llm.max_retries == 0 {
            return Err(FilterError::Config("LLM_MAX_RETRIES must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(FilterError::Config(format!(
                "LLM_TEMPERATURE must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }

    pub fn require_imap(&self) -> Result<&ImapSettings> {
        self.imap.as_ref().ok_or_else(|| {
            FilterError::Config(
                "ALERT_IMAP_URI and ALERT_IMAP_PASSWORD must both be set".to_string(),
            )
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FilterError::Config(format!("{} has an invalid value: '{}'", name, raw))),
        None => Ok(default),
    }
}
