//! Gateway configuration: a TOML file plus `MAILBELL_*` environment overrides

use std::path::Path;

use config::{Config, Environment, File, FileFormat, Source};
use serde::Deserialize;
use thiserror::Error;

use crate::service::{DiscordService, MessageFormat, Service, TelegramService};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Everything the binary needs to run a gateway
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Notification targets, in dispatch order
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// SMTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Name announced in the greeting and HELO/EHLO replies
    pub hostname: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2525,
            hostname: "mailbell.local".to_string(),
        }
    }
}

impl SmtpConfig {
    /// `host:port`, suitable for [`SmtpServer::start`](crate::SmtpServer::start)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One `[[services]]` entry, selected by its `kind`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServiceConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
        /// Defaults to HTML
        #[serde(default)]
        format: Option<MessageFormat>,
    },
    Discord {
        webhook_url: String,
        /// Defaults to Markdown
        #[serde(default)]
        format: Option<MessageFormat>,
    },
}

impl ServiceConfig {
    pub fn build(&self) -> Box<dyn Service> {
        match self {
            Self::Telegram {
                bot_token,
                chat_id,
                format,
            } => Box::new(TelegramService::new(
                bot_token.clone(),
                chat_id.clone(),
                format.unwrap_or(MessageFormat::Html),
            )),
            Self::Discord {
                webhook_url,
                format,
            } => Box::new(DiscordService::new(
                webhook_url.clone(),
                format.unwrap_or(MessageFormat::Markdown),
            )),
        }
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Telegram {
                bot_token, chat_id, ..
            } => vec![("bot_token", bot_token), ("chat_id", chat_id)],
            Self::Discord { webhook_url, .. } => vec![("webhook_url", webhook_url)],
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("MAILBELL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl GatewayConfig {
    /// Load `path` (if it exists) and apply environment overrides such as
    /// `MAILBELL_SMTP__PORT=2526`. The result is validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_sources(File::from(path.as_ref()).required(false), environment())
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn from_sources<S>(file: S, env: Environment) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let config: Self = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smtp.host.trim().is_empty() {
            return Err(invalid("smtp.host", "must not be empty"));
        }
        if self.smtp.port == 0 {
            return Err(invalid("smtp.port", "must be between 1 and 65535"));
        }
        if self.smtp.hostname.trim().is_empty() {
            return Err(invalid("smtp.hostname", "must not be empty"));
        }

        for (index, service) in self.services.iter().enumerate() {
            for (field, value) in service.required_fields() {
                if value.trim().is_empty() {
                    return Err(invalid(
                        &format!("services[{index}].{field}"),
                        "must not be empty",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
