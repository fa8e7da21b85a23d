use std::net::SocketAddr;
use talkbook_core::provider::Provider;
use talkbook_core::vision::DEFAULT_VISION_MODEL;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// Provider keys are optional: requests may bring their own.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: Option<String>,
    pub outspeed_api_key: Option<String>,
    pub openai_api_base: String,
    pub outspeed_api_base: String,
    pub transcribe_model: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = non_empty_var("OPENAI_API_KEY");
        let outspeed_api_key = non_empty_var("OUTSPEED_API_KEY");

        let openai_api_base = api_base_var("OPENAI_API_BASE", Provider::OpenAI)?;
        let outspeed_api_base = api_base_var("OUTSPEED_API_BASE", Provider::Outspeed)?;

        let transcribe_model =
            non_empty_var("TRANSCRIBE_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            outspeed_api_key,
            openai_api_base,
            outspeed_api_base,
            transcribe_model,
            log_level,
        })
    }

    /// The server's own key for `provider`, if one is configured.
    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Outspeed => self.outspeed_api_key.as_deref(),
        }
    }

    pub fn api_base(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAI => &self.openai_api_base,
            Provider::Outspeed => &self.outspeed_api_base,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn api_base_var(name: &str, provider: Provider) -> Result<String, ConfigError> {
    let Some(base) = non_empty_var(name) else {
        return Ok(provider.default_api_base().to_string());
    };
    if !base.starts_with("http://") && !base.starts_with("https://") {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not an http(s) URL", base),
        ));
    }
    Ok(base.trim_end_matches('/').to_string())
}
