use crate::models::{HapiResponse, Location};
use crate::{APP_IDENTIFIER_HEADER, APP_IDENTIFIER_PARAM, HAPI_BASE_URL};
use base64::Engine as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default request timeout, matching the HAPI guidance for metadata calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the HAPI client
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Base URL for the HAPI API (e.g., "https://hapi.humdata.org/api/v2")
    pub base_path: String,
    /// API key sent in the `X-HDX-HAPI-APP-IDENTIFIER` header
    pub api_key: Option<ApiKey>,
    /// Application name, part of the encoded `app_identifier`
    pub app_name: String,
    /// Contact email, part of the encoded `app_identifier`
    pub app_email: String,
    /// Timeout applied to every request
    pub timeout: Duration,
    /// User agent string for HTTP requests
    pub user_agent: Option<String>,
}

/// API key configuration
///
/// The key is never printed; `Debug` shows a redacted placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    /// The actual API key value
    pub key: String,
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            base_path: HAPI_BASE_URL.to_owned(),
            api_key: None,
            app_name: "hdx-hapi-rs".to_owned(),
            app_email: "assistant@example.com".to_owned(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: Some(concat!("hdx-hapi-rs/", env!("CARGO_PKG_VERSION")).to_owned()),
        }
    }
}

impl Configuration {
    /// Create a configuration for the production API using the given key
    pub fn new<S: Into<String>>(api_key: S) -> Configuration {
        Configuration {
            api_key: Some(ApiKey {
                key: api_key.into(),
            }),
            ..Configuration::default()
        }
    }

    /// Point the client at another HAPI deployment
    pub fn with_base_path<S: Into<String>>(mut self, base_path: S) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Set the application name and contact email encoded into `app_identifier`
    pub fn with_app_identity<N: Into<String>, E: Into<String>>(mut self, name: N, email: E) -> Self {
        self.app_name = name.into();
        self.app_email = email.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set custom user agent
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// The base64 `app_identifier` query value for this configuration
    pub fn app_identifier(&self) -> String {
        encode_app_identifier(&self.app_name, &self.app_email)
    }
}

/// Encode `name:email` the way HAPI expects its `app_identifier` parameter.
pub fn encode_app_identifier(app_name: &str, app_email: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{app_name}:{app_email}"))
}

/// Errors that can occur when interacting with HAPI
#[derive(Debug, Error)]
pub enum HapiError {
    /// Network, timeout, or other transport-level failures
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body did not match the expected shape
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// HAPI answered with a non-success status
    #[error("HAPI error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body as returned by HAPI
        message: String,
    },

    /// A call was rejected before any request was made
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The client could not be built from its configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl HapiError {
    /// HTTP status of an upstream rejection, if that is what this error is.
    pub fn status(&self) -> Option<u16> {
        match self {
            HapiError::Api { status, .. } => Some(*status),
            HapiError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// # HAPI Client
///
/// Thin async client over the HDX Humanitarian API. Every request goes through one
/// shared `reqwest::Client` carrying the API key header, JSON accept headers and the
/// configured timeout; the encoded `app_identifier` is appended to every query string.
///
/// Paths may be given either relative to the base URL (`/metadata/location`) or as they
/// appear in the OpenAPI document (`/api/v2/metadata/location`); the shared prefix is
/// not duplicated.
#[derive(Clone)]
pub struct HapiClient {
    configuration: Arc<Configuration>,
    http: reqwest::Client,
    base_url: Url,
    app_identifier: String,
}

impl std::fmt::Debug for HapiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapiClient")
            .field("base_path", &self.configuration.base_path)
            .finish()
    }
}

impl HapiClient {
    /// Create a new HAPI client instance
    ///
    /// Fails if the base path is not a valid URL or the API key cannot be sent as a header.
    pub fn new(configuration: Arc<Configuration>) -> Result<Self, HapiError> {
        let base_url = Url::parse(&configuration.base_path).map_err(|e| {
            HapiError::InvalidConfiguration(format!(
                "invalid base path '{}': {e}",
                configuration.base_path
            ))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &configuration.api_key {
            let mut value = HeaderValue::from_str(&api_key.key).map_err(|_| {
                HapiError::InvalidConfiguration(
                    "API key contains characters not allowed in a header".to_string(),
                )
            })?;
            value.set_sensitive(true);
            headers.insert(APP_IDENTIFIER_HEADER, value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(configuration.timeout)
            .default_headers(headers);
        if let Some(user_agent) = &configuration.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let http = builder.build()?;

        let app_identifier = configuration.app_identifier();

        Ok(Self {
            configuration,
            http,
            base_url,
            app_identifier,
        })
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Resolve an endpoint path against the base URL.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, HapiError> {
        let prefix = self.base_url.path().trim_end_matches('/');
        let relative = match path.strip_prefix(prefix) {
            Some(rest) if !prefix.is_empty() && (rest.is_empty() || rest.starts_with('/')) => {
                rest
            }
            _ => path,
        };

        let joined = format!(
            "{}/{}",
            self.configuration.base_path.trim_end_matches('/'),
            relative.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| HapiError::InvalidArgument(format!("invalid endpoint path '{path}': {e}")))
    }

    /// Start an authenticated request for `path`.
    ///
    /// The returned builder already carries the `app_identifier` query pair; further
    /// `.query()` calls append to it.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, HapiError> {
        let url = self.endpoint_url(path)?;
        Ok(self
            .http
            .request(method, url)
            .query(&[(APP_IDENTIFIER_PARAM, self.app_identifier.as_str())]))
    }

    /// Send a request and return the body of a successful response.
    pub async fn send_text(&self, request: RequestBuilder) -> Result<String, HapiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "HAPI request rejected");
            return Err(HapiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(body)
    }

    /// GET `path` with extra query pairs and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HapiError> {
        let request = self.request(Method::GET, path)?.query(query);
        let body = self.send_text(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// List every location known to HAPI, in upstream order.
    pub async fn metadata_locations(&self) -> Result<Vec<Location>, HapiError> {
        let response: HapiResponse<Location> = self.get_json("/metadata/location", &[]).await?;
        Ok(response.data)
    }

    /// Look up dataset metadata by HDX dataset id (or name).
    ///
    /// Returns the raw records; an unknown id yields an empty list.
    pub async fn metadata_dataset(&self, dataset_hdx_id: &str) -> Result<Vec<Value>, HapiError> {
        if dataset_hdx_id.trim().is_empty() {
            return Err(HapiError::InvalidArgument(
                "dataset_hdx_id must not be blank".to_string(),
            ));
        }

        let response: HapiResponse<Value> = self
            .get_json("/metadata/dataset", &[("dataset_hdx_id", dataset_hdx_id)])
            .await?;
        Ok(response.data)
    }
}
