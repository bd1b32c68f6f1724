use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_VERIFY_DEBOUNCE: Duration = Duration::from_millis(200);
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_VIDEO_THRESHOLD: f32 = 0.9;

/// Runtime knobs for the completion engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Backend root. Unset means no remote backend is configured.
    pub api_base_url: Option<Url>,
    pub api_token: Option<String>,
    /// Quiet period before a verification call is sent.
    pub verify_debounce: Duration,
    /// Wait before a forced refresh after a failed submission or verification.
    pub refresh_delay: Duration,
    /// Fraction of a video that counts as watched.
    pub video_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_token: None,
            verify_debounce: DEFAULT_VERIFY_DEBOUNCE,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            video_threshold: DEFAULT_VIDEO_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Read the `STUDY_*` environment variables, defaulting whatever is unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a set variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a present value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(raw) = read("STUDY_API_BASE_URL") {
            let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
                name: "STUDY_API_BASE_URL",
                source,
            })?;
            config.api_base_url = Some(url);
        }
        config.api_token = read("STUDY_API_TOKEN").map(|token| token.trim().to_string());
        if let Some(raw) = read("STUDY_VERIFY_DEBOUNCE_MS") {
            config.verify_debounce = parse_millis("STUDY_VERIFY_DEBOUNCE_MS", &raw)?;
        }
        if let Some(raw) = read("STUDY_REFRESH_DELAY_MS") {
            config.refresh_delay = parse_millis("STUDY_REFRESH_DELAY_MS", &raw)?;
        }
        if let Some(raw) = read("STUDY_VIDEO_THRESHOLD") {
            config.video_threshold = raw
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|value| *value > 0.0 && *value <= 1.0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: "STUDY_VIDEO_THRESHOLD",
                    expected: "a fraction in (0, 1]",
                    value: raw.clone(),
                })?;
        }
        Ok(config)
    }
}

fn parse_millis(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue {
            name,
            expected: "milliseconds",
            value: raw.to_string(),
        })
}
