//! # Configuration Management
//!
//! Layered configuration: built-in defaults, then an optional `config.toml`,
//! then `APP_`-prefixed environment variables, with `HOST`/`PORT` and the
//! credential variables (`WEBSOCKET_SERVER_API_KEY`,
//! `WEBSOCKET_SERVER_CLIENT_SECRET`) as deployment-platform overrides.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub speech: SpeechConfig,
    pub performance: PerformanceConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Credentials clients must present on the WebSocket upgrade.
///
/// The shared secret pairs with the client's `signature-input`/`signature`
/// headers. Signature verification is not performed beyond presence checks;
/// see the handshake validation in `websocket.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub api_key: String,
    pub client_secret: String,
}

/// Speech provider settings.
///
/// ## Fields:
/// - `recognizer_url`: upstream recognition WebSocket the bundled provider
///   streams decoded audio to
/// - `default_language`: recognition language used when the client's `open`
///   does not carry one
/// - `assist_window`: utterances per rolling agent-assist summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub recognizer_url: String,
    pub default_language: String,
    pub assist_window: usize,
}

/// Performance tuning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            auth: AuthConfig {
                api_key: "SGVsbG8sIEkgYW0gdGhlIEF1ZGlvSG9vayBzYW1wbGUgQVBJIGtleSE".to_string(),
                client_secret: "TXlTdXBlclNlY3JldEtleVRlbGxOby0xITJAMyM0JDU2Nw".to_string(),
            },
            speech: SpeechConfig {
                recognizer_url: "ws://127.0.0.1:9090/recognize".to_string(),
                default_language: "en-US".to_string(),
                assist_window: 3,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 50,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and the environment,
    /// in that priority order (later sources win).
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // APP_SERVER_HOST becomes server.host, etc.
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment-platform variables that do not follow the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("WEBSOCKET_SERVER_API_KEY") {
            settings = settings.set_override("auth.api_key", api_key)?;
        }

        if let Ok(secret) = env::var("WEBSOCKET_SERVER_CLIENT_SECRET") {
            settings = settings.set_override("auth.client_secret", secret)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly serve traffic.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.auth.api_key.is_empty() {
            return Err(anyhow::anyhow!("API key cannot be empty"));
        }

        if self.speech.recognizer_url.is_empty() {
            return Err(anyhow::anyhow!("Recognizer URL cannot be empty"));
        }

        if self.speech.assist_window == 0 {
            return Err(anyhow::anyhow!("Assist window must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.speech.default_language, "en-US");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.speech.assist_window = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.api_key.clear();
        assert!(config.validate().is_err());
    }
}
