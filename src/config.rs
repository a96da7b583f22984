//! Configuration for schoolhub
//!
//! Connection settings come from the environment (optionally a `.env` file
//! loaded by the binary). Client behaviour is tuned with [`ClientOptions`].

use crate::error::{Error, Result};
use schoolhub_auth::AuthOptions;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_DEPLOY: &str = "SCHOOLHUB_ENV";
pub const ENV_DEMO_SETUP_KEY: &str = "DEMO_SETUP_KEY";
pub const ENV_REQUEST_TIMEOUT: &str = "SCHOOLHUB_REQUEST_TIMEOUT_SECS";

/// Shared secret accepted by the demo seeder when none is configured.
pub const DEFAULT_DEMO_SETUP_KEY: &str = "demo-setup-key-123";

const PLACEHOLDER_MARKERS: [&str; 3] = ["your-project", "your-anon-key", "example"];

/// Returns true for values copied straight from a template.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || PLACEHOLDER_MARKERS.iter().any(|m| value.contains(m))
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployEnv {
    Development,
    #[default]
    Production,
}

impl FromStr for DeployEnv {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeployEnv::Development),
            "production" | "prod" => Ok(DeployEnv::Production),
            other => Err(Error::invalid_input(format!(
                "unknown deploy environment '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployEnv::Development => write!(f, "development"),
            DeployEnv::Production => write!(f, "production"),
        }
    }
}

/// Whether the external service can be reached at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStatus {
    Ready,
    /// Names of the environment variables that are missing or placeholders
    NeedsSetup { missing: Vec<String> },
}

impl SetupStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SetupStatus::Ready)
    }
}

/// URL and public key of a configured project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub anon_key: String,
}

/// Connection settings read from the environment
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_role_key: Option<String>,
    pub deploy_env: DeployEnv,
    pub demo_setup_key: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl ServiceConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let deploy_env = match lookup(ENV_DEPLOY) {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => DeployEnv::default(),
        };

        let request_timeout = match lookup(ENV_REQUEST_TIMEOUT) {
            Some(value) if !value.trim().is_empty() => {
                let secs: u64 = value.trim().parse().map_err(|_| {
                    Error::invalid_input(format!("{} must be whole seconds", ENV_REQUEST_TIMEOUT))
                })?;
                Some(Duration::from_secs(secs))
            }
            _ => None,
        };

        Ok(Self {
            url: lookup(ENV_URL),
            anon_key: lookup(ENV_ANON_KEY),
            service_role_key: lookup(ENV_SERVICE_ROLE_KEY),
            deploy_env,
            demo_setup_key: lookup(ENV_DEMO_SETUP_KEY),
            request_timeout,
        })
    }

    /// Builds a ready configuration for a known project.
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            anon_key: Some(anon_key.to_string()),
            ..Default::default()
        }
    }

    pub fn with_service_role_key(mut self, key: &str) -> Self {
        self.service_role_key = Some(key.to_string());
        self
    }

    pub fn with_deploy_env(mut self, env: DeployEnv) -> Self {
        self.deploy_env = env;
        self
    }

    /// Decides whether the application can run or must show setup.
    ///
    /// Only the URL and public key are required. The service role key is
    /// checked separately by the demo seeder.
    pub fn setup_status(&self) -> SetupStatus {
        let mut missing = Vec::new();
        if !is_usable(&self.url) {
            missing.push(ENV_URL.to_string());
        }
        if !is_usable(&self.anon_key) {
            missing.push(ENV_ANON_KEY.to_string());
        }

        if missing.is_empty() {
            SetupStatus::Ready
        } else {
            SetupStatus::NeedsSetup { missing }
        }
    }

    /// URL and public key, or `NotConfigured` naming what is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        match (self.setup_status(), &self.url, &self.anon_key) {
            (SetupStatus::Ready, Some(url), Some(anon_key)) => Ok(Credentials {
                url: url.trim().to_string(),
                anon_key: anon_key.trim().to_string(),
            }),
            (SetupStatus::NeedsSetup { missing }, _, _) => Err(Error::NotConfigured { missing }),
            _ => Err(Error::NotConfigured {
                missing: vec![ENV_URL.to_string(), ENV_ANON_KEY.to_string()],
            }),
        }
    }

    /// The service role key, if one is configured and not a placeholder.
    pub fn service_role_key(&self) -> Option<&str> {
        self.service_role_key
            .as_deref()
            .filter(|key| !is_placeholder(key))
            .map(str::trim)
    }

    /// Shared secret for the demo seeder.
    pub fn demo_setup_key(&self) -> &str {
        self.demo_setup_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(DEFAULT_DEMO_SETUP_KEY)
    }

    /// Client options with the configured request timeout applied.
    pub fn client_options(&self) -> ClientOptions {
        let options = ClientOptions::default();
        match self.request_timeout {
            Some(timeout) => options.with_request_timeout(Some(timeout)),
            None => options,
        }
    }
}

fn is_usable(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !is_placeholder(v))
}

/// Configuration options for the schoolhub client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whether to automatically refresh the token
    pub auto_refresh_token: bool,

    /// Whether the session is kept in memory after sign-in
    pub persist_session: bool,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// How long sign-in waits for the profile to load
    pub settle_timeout: Duration,

    /// Capacity of the session-change broadcast
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            request_timeout: Some(Duration::from_secs(30)),
            settle_timeout: Duration::from_secs(10),
            event_capacity: 16,
        }
    }
}

impl ClientOptions {
    /// Set whether to automatically refresh the token
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    /// Set whether to persist the session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set how long sign-in waits for the mirrored state
    pub fn with_settle_timeout(mut self, value: Duration) -> Self {
        self.settle_timeout = value;
        self
    }

    pub(crate) fn auth_options(&self) -> AuthOptions {
        AuthOptions {
            auto_refresh_token: self.auto_refresh_token,
            persist_session: self.persist_session,
            event_capacity: self.event_capacity,
        }
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}
