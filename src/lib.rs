//! schoolhub
//!
//! Role-based school management on top of a hosted Supabase project. The
//! crate mirrors the remote session into local state, loads the role-tagged
//! profile of the signed-in user and gates every page by role.

pub mod access;
pub mod analytics;
pub mod app;
pub mod config;
pub mod dashboard;
pub mod directory;
pub mod error;
pub mod models;
pub mod seed;
pub mod session;
pub mod util;

use reqwest::Client;
use schoolhub_auth::{AdminAuth, Auth};
use schoolhub_postgrest::{PostgrestClient, PostgrestError};

use crate::config::{ClientOptions, ServiceConfig};
use crate::error::{Error, Result};

pub use schoolhub_auth;
pub use schoolhub_postgrest;

/// Connection to the identity provider and the row store
pub struct SchoolHub {
    /// The base URL for the project
    pub url: String,
    /// The public API key for the project
    pub key: String,
    /// HTTP client used for requests
    pub http_client: Client,
    /// Auth client for sign-in and session changes
    pub auth: Auth,
    /// Client options
    pub options: ClientOptions,
    service_role_key: Option<String>,
}

impl SchoolHub {
    /// Create a new client
    ///
    /// # Example
    ///
    /// ```no_run
    /// use schoolhub::SchoolHub;
    ///
    /// let hub = SchoolHub::new("https://abc.supabase.co", "public-anon-key").unwrap();
    /// let subjects = hub.from("subjects").unwrap();
    /// ```
    pub fn new(url: &str, key: &str) -> Result<Self> {
        Self::new_with_options(url, key, ClientOptions::default())
    }

    /// Create a new client with custom options
    pub fn new_with_options(url: &str, key: &str, options: ClientOptions) -> Result<Self> {
        let http_client = options.http_client()?;
        let url = url.trim_end_matches('/');

        let auth = Auth::new(url, key, http_client.clone(), options.auth_options());

        Ok(Self {
            url: url.to_string(),
            key: key.to_string(),
            http_client,
            auth,
            options,
            service_role_key: None,
        })
    }

    /// Create a client from environment settings.
    ///
    /// Fails with `NotConfigured` when the URL or public key is missing.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let credentials = config.credentials()?;
        let hub = Self::new_with_options(
            &credentials.url,
            &credentials.anon_key,
            config.client_options(),
        )?;
        Ok(match config.service_role_key() {
            Some(key) => hub.with_service_role_key(key),
            None => hub,
        })
    }

    /// Enables admin calls made with the service role key.
    pub fn with_service_role_key(mut self, key: &str) -> Self {
        self.auth.init_admin(key);
        self.service_role_key = Some(key.to_string());
        self
    }

    /// Get a reference to the auth client
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Admin auth client, when a service role key is set
    pub fn admin(&self) -> Result<&AdminAuth> {
        self.auth.admin().ok_or_else(|| Error::NotConfigured {
            missing: vec![config::ENV_SERVICE_ROLE_KEY.to_string()],
        })
    }

    /// Query builder for `table`, acting as the signed-in user when there is one
    pub fn from(&self, table: &str) -> std::result::Result<PostgrestClient, PostgrestError> {
        let client = PostgrestClient::new(&self.url, &self.key, table, self.http_client.clone());
        match self.auth.get_session() {
            Some(session) => client.with_auth(&session.access_token),
            None => Ok(client),
        }
    }

    /// Query builder for `table` that bypasses row level security
    pub fn service_from(&self, table: &str) -> Result<PostgrestClient> {
        let key = self
            .service_role_key
            .as_deref()
            .ok_or_else(|| Error::NotConfigured {
                missing: vec![config::ENV_SERVICE_ROLE_KEY.to_string()],
            })?;
        Ok(PostgrestClient::new(&self.url, key, table, self.http_client.clone()).with_auth(key)?)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::access::{
        check_page, entry_route, navigation_for, require_any, require_auth, GuardDecision, Page,
        Role, Route,
    };
    pub use crate::app::App;
    pub use crate::config::{ClientOptions, ServiceConfig, SetupStatus};
    pub use crate::error::{Error, Result};
    pub use crate::models::{NewProfileFields, Profile, ProfileUpdate};
    pub use crate::session::{AuthContext, AuthState};
    pub use crate::SchoolHub;
}
