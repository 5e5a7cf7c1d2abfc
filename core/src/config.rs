//! Client configuration.
//!
//! A `ClientConfig` is built once and moved into the dispatcher; nothing in
//! it changes afterwards, so two clients with different keys never share
//! state.

use std::fmt;
use std::time::Duration;

use ::config::{Config, Environment, Map};
use serde::Deserialize;

use crate::error::{Error, ErrorCode, Result};

pub const DEFAULT_SCHEME: &str = "https";
pub const DEFAULT_HOST: &str = "view-api.box.com";
/// File uploads go to a dedicated host.
pub const DEFAULT_UPLOAD_HOST: &str = "upload.view-api.box.com";
pub const DEFAULT_BASE_PATH: &str = "/1";
/// How long the throttle retry loop may run, measured from the first attempt.
pub const DEFAULT_ABSOLUTE_TIMEOUT: Duration = Duration::from_secs(62);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Every environment setting shares this prefix, e.g. `BOX_VIEW_API_KEY`.
pub const ENV_PREFIX: &str = "BOX_VIEW";
pub const ENV_API_KEY: &str = "BOX_VIEW_API_KEY";
pub const ENV_SCHEME: &str = "BOX_VIEW_SCHEME";
pub const ENV_HOST: &str = "BOX_VIEW_HOST";
pub const ENV_UPLOAD_HOST: &str = "BOX_VIEW_UPLOAD_HOST";
pub const ENV_ABSOLUTE_TIMEOUT: &str = "BOX_VIEW_ABSOLUTE_TIMEOUT_SECS";

/// The `BOX_VIEW_*` variables, keyed by what follows the prefix.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    api_key: Option<String>,
    scheme: Option<String>,
    host: Option<String>,
    upload_host: Option<String>,
    absolute_timeout_secs: Option<u64>,
}

impl EnvSettings {
    /// Read from `vars` when given, the process environment otherwise.
    fn load(vars: Option<Map<String, String>>) -> Result<Self> {
        Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).source(vars))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| {
                Error::new(
                    ErrorCode::InvalidConfig,
                    format!("{ENV_PREFIX}_* settings are invalid: {e}"),
                )
            })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: String,
    pub scheme: String,
    pub host: String,
    pub upload_host: String,
    pub base_path: String,
    pub absolute_timeout: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            upload_host: DEFAULT_UPLOAD_HOST.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            absolute_timeout: DEFAULT_ABSOLUTE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: concat!("boxview-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Load from the process environment, after reading a `.env` file if one
    /// exists. `BOX_VIEW_API_KEY` is required.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_settings(EnvSettings::load(None)?)
    }

    /// Same as `from_env`, but reads `vars` instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::from_settings(EnvSettings::load(Some(vars))?)
    }

    fn from_settings(settings: EnvSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::new(ErrorCode::InvalidConfig, format!("{ENV_API_KEY} is not set")))?;

        let mut config = Self::new(api_key.trim());
        if let Some(scheme) = settings.scheme {
            config = config.with_scheme(&scheme);
        }
        if let Some(host) = settings.host {
            config = config.with_host(&host);
        }
        if let Some(host) = settings.upload_host {
            config = config.with_upload_host(&host);
        }
        if let Some(secs) = settings.absolute_timeout_secs {
            config = config.with_absolute_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.trim_end_matches("://").to_string();
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.trim_end_matches('/').to_string();
        self
    }

    pub fn with_upload_host(mut self, host: &str) -> Self {
        self.upload_host = host.trim_end_matches('/').to_string();
        self
    }

    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.trim_end_matches('/').to_string();
        self
    }

    pub fn with_absolute_timeout(mut self, timeout: Duration) -> Self {
        self.absolute_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// `scheme://host/base_path`, using `host` when given instead of the
    /// default API host.
    pub fn base_url(&self, host: Option<&str>) -> String {
        format!(
            "{}://{}{}",
            self.scheme,
            host.unwrap_or(&self.host),
            self.base_path
        )
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[redacted]")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("upload_host", &self.upload_host)
            .field("base_path", &self.base_path)
            .field("absolute_timeout", &self.absolute_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
