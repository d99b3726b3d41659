use hdx_hapi::{Configuration, HAPI_BASE_URL, HAPI_OPENAPI_URL};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_APP_NAME: &str = "hdx-mcp-server";
pub const DEFAULT_APP_EMAIL: &str = "assistant@example.com";

/// Startup settings, read once from the environment.
///
/// Built before anything else runs and shared read-only afterwards.
#[derive(Clone)]
pub struct Settings {
    /// HAPI key (`HDX_API_KEY`), required
    pub api_key: String,
    /// HAPI base URL (`HDX_BASE_URL`)
    pub base_url: String,
    /// OpenAPI document URL (`HDX_OPENAPI_URL`)
    pub openapi_url: String,
    /// Timeout for every outbound call (`HDX_TIMEOUT`, seconds)
    pub timeout: Duration,
    /// Application name for the `app_identifier` (`HDX_APP_NAME`)
    pub app_name: String,
    /// Contact email for the `app_identifier` (`HDX_APP_EMAIL`)
    pub app_email: String,
    /// Bind host for the HTTP transport (`MCP_HOST`)
    pub host: String,
    /// Bind port for the HTTP transport (`MCP_PORT`)
    pub port: u16,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("openapi_url", &self.openapi_url)
            .field("timeout", &self.timeout)
            .field("app_name", &self.app_name)
            .field("app_email", &self.app_email)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("HDX_API_KEY").ok_or(ConfigError::Missing("HDX_API_KEY"))?;

        let timeout = match var("HDX_TIMEOUT") {
            Some(raw) => parse_timeout(&raw)?,
            None => Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        };

        let port = match var("MCP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "MCP_PORT",
                message: format!("'{raw}': {e}"),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            api_key,
            base_url: var("HDX_BASE_URL").unwrap_or_else(|| HAPI_BASE_URL.to_string()),
            openapi_url: var("HDX_OPENAPI_URL").unwrap_or_else(|| HAPI_OPENAPI_URL.to_string()),
            timeout,
            app_name: var("HDX_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            app_email: var("HDX_APP_EMAIL").unwrap_or_else(|| DEFAULT_APP_EMAIL.to_string()),
            host: var("MCP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        })
    }

    /// Apply command-line overrides for the HTTP listener.
    pub fn with_listener(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// Client configuration carrying the credentials and timeout.
    pub fn hapi_configuration(&self) -> Configuration {
        Configuration::new(self.api_key.clone())
            .with_base_path(self.base_url.clone())
            .with_app_identity(self.app_name.clone(), self.app_email.clone())
            .with_timeout(self.timeout)
            .with_user_agent(concat!("hdx-mcp-server/", env!("CARGO_PKG_VERSION")))
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    let secs = raw.parse::<f64>().map_err(|e| ConfigError::Invalid {
        name: "HDX_TIMEOUT",
        message: format!("'{raw}': {e}"),
    })?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::Invalid {
            name: "HDX_TIMEOUT",
            message: format!("'{raw}': must be a positive number of seconds"),
        });
    }

    Ok(Duration::from_secs_f64(secs))
}
