use std::env;
use std::time::Duration;

use url::Url;

use crate::pipeline::{DEFAULT_DEBOUNCE, DEFAULT_RETRY_DELAY, PipelineSettings};
use crate::wikipedia::client::DEFAULT_ENDPOINT;

const ENDPOINT_VAR: &str = "WIKISEARCH_ENDPOINT";
const LANG_VAR: &str = "WIKISEARCH_LANG";
const DEBOUNCE_VAR: &str = "WIKISEARCH_DEBOUNCE_MS";
const RETRY_DELAY_VAR: &str = "WIKISEARCH_RETRY_DELAY_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a number of milliseconds, got '{value}'")]
    InvalidMillis { var: &'static str, value: String },

    #[error("invalid language code '{0}': expected 2-12 characters of a-z or '-'")]
    InvalidLang(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("endpoint must use http or https, got '{0}'")]
    InvalidScheme(String),
}

/// Values given on the command line; each one beats its environment variable.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub lang: Option<String>,
    pub debounce_ms: Option<u64>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub endpoint: Url,
    pub settings: PipelineSettings,
}

impl Config {
    /// Resolution order per value: CLI flag, then environment, then default.
    /// An explicit endpoint wins over a language code.
    pub fn from_env(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve(|key| env::var(key).ok(), overrides)
    }

    fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let endpoint = match overrides.endpoint.clone().or_else(|| var(ENDPOINT_VAR)) {
            Some(raw) => parse_endpoint(&raw)?,
            None => {
                let lang = overrides
                    .lang
                    .clone()
                    .or_else(|| var(LANG_VAR))
                    .unwrap_or_else(|| "en".to_string());
                endpoint_for_lang(&lang)?
            }
        };

        let debounce = match overrides.debounce_ms {
            Some(ms) => Duration::from_millis(ms),
            None => parse_millis(DEBOUNCE_VAR, var(DEBOUNCE_VAR))?.unwrap_or(DEFAULT_DEBOUNCE),
        };
        let retry_delay = match overrides.retry_delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None => parse_millis(RETRY_DELAY_VAR, var(RETRY_DELAY_VAR))?
                .unwrap_or(DEFAULT_RETRY_DELAY),
        };

        Ok(Self {
            endpoint,
            settings: PipelineSettings {
                debounce,
                retry_delay,
            },
        })
    }
}

/// Opensearch endpoint of the Wikipedia edition for `lang` (e.g. `de`, `zh-yue`).
pub fn endpoint_for_lang(lang: &str) -> Result<Url, ConfigError> {
    let lang = lang.trim().to_ascii_lowercase();
    let valid = (2..=12).contains(&lang.len())
        && lang.chars().all(|c| c.is_ascii_lowercase() || c == '-')
        && !lang.starts_with('-')
        && !lang.ends_with('-');
    if !valid {
        return Err(ConfigError::InvalidLang(lang));
    }
    if lang == "en" {
        return Ok(Url::parse(DEFAULT_ENDPOINT)?);
    }
    Ok(Url::parse(&format!("https://{lang}.wikipedia.org/w/api.php"))?)
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidScheme(other.to_string())),
    }
}

fn parse_millis(var: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidMillis { var, value: v })
        })
        .transpose()
}
