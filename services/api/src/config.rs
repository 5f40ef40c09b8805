use interview_core::{settings::DialogueSettings, voice::VoicePreference};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub settle_delay: Duration,
    pub speech_rate: f32,
    pub speech_lang: String,
    pub voice_hints: Vec<String>,
    pub max_no_speech_retries: u32,
    pub closing_remark: String,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let defaults = DialogueSettings::default();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let settle_delay_ms = parse_var(
            "SETTLE_DELAY_MS",
            defaults.settle_delay.as_millis() as u64,
        )?;

        let speech_rate = parse_var("SPEECH_RATE", defaults.speech_rate)?;
        if !(0.1..=10.0).contains(&speech_rate) {
            return Err(ConfigError::InvalidValue(
                "SPEECH_RATE".to_string(),
                format!("{} is outside 0.1..=10", speech_rate),
            ));
        }

        let speech_lang =
            std::env::var("SPEECH_LANG").unwrap_or_else(|_| defaults.voice.language.clone());
        if speech_lang.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "SPEECH_LANG".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let voice_hints = match std::env::var("VOICE_HINTS") {
            Ok(hints) => hints
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => defaults.voice.name_hints.clone(),
        };

        let max_no_speech_retries =
            parse_var("MAX_NO_SPEECH_RETRIES", defaults.max_no_speech_retries)?;

        let closing_remark =
            std::env::var("CLOSING_REMARK").unwrap_or_else(|_| defaults.closing_remark.clone());

        Ok(Self {
            bind_address,
            log_level,
            settle_delay: Duration::from_millis(settle_delay_ms),
            speech_rate,
            speech_lang,
            voice_hints,
            max_no_speech_retries,
            closing_remark,
        })
    }

    /// The per-session tunables handed to each dialogue controller.
    pub fn dialogue_settings(&self) -> DialogueSettings {
        DialogueSettings {
            settle_delay: self.settle_delay,
            speech_rate: self.speech_rate,
            voice: VoicePreference {
                language: self.speech_lang.clone(),
                name_hints: self.voice_hints.clone(),
            },
            max_no_speech_retries: self.max_no_speech_retries,
            closing_remark: self.closing_remark.clone(),
        }
    }
}
