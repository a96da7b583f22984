//! The application object handed to every command

use crate::access::{check_page, entry_route, navigation_for, GuardDecision, Page};
use crate::config::{ServiceConfig, SetupStatus};
use crate::dashboard::Dashboard;
use crate::error::{Error, Result};
use crate::session::{AuthContext, AuthState};
use crate::SchoolHub;
use log::info;
use std::sync::Arc;

/// Configuration, clients and the session mirror.
///
/// Created once with [`App::start`] and passed to whatever needs it. Dropping
/// it (or calling [`App::shutdown`]) stops the session listener.
pub struct App {
    config: ServiceConfig,
    hub: Option<Arc<SchoolHub>>,
    auth: AuthContext,
}

impl App {
    /// Builds clients from `config` and restores any existing session.
    ///
    /// Missing credentials are not an error: the app starts in setup mode and
    /// every guarded page redirects to the setup screen.
    pub async fn start(config: ServiceConfig) -> Result<Self> {
        let (hub, auth) = match config.setup_status() {
            SetupStatus::NeedsSetup { missing } => (None, AuthContext::unconfigured(missing)),
            SetupStatus::Ready => {
                let hub = Arc::new(SchoolHub::from_config(&config)?);
                let auth = AuthContext::connect(Arc::clone(&hub), &hub.options).await;
                info!("Connected to {}", hub.url);
                (Some(hub), auth)
            }
        };

        Ok(Self { config, hub, auth })
    }

    /// Loads configuration from the environment, then starts.
    pub async fn from_env() -> Result<Self> {
        Self::start(ServiceConfig::from_env()?).await
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn hub(&self) -> Result<&SchoolHub> {
        self.hub.as_deref().ok_or_else(|| Error::NotConfigured {
            missing: match self.config.setup_status() {
                SetupStatus::NeedsSetup { missing } => missing,
                SetupStatus::Ready => Vec::new(),
            },
        })
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn state(&self) -> AuthState {
        self.auth.snapshot()
    }

    pub fn entry(&self) -> GuardDecision {
        entry_route(&self.state())
    }

    pub fn check(&self, page: Page) -> GuardDecision {
        check_page(&self.state(), page)
    }

    /// Like [`App::check`], for a dashboard path such as `/dashboard/students`.
    pub fn check_path(&self, path: &str) -> Result<GuardDecision> {
        let page = Page::from_path(path)
            .ok_or_else(|| Error::invalid_input(format!("unknown page '{}'", path)))?;
        Ok(self.check(page))
    }

    /// Menu for the signed-in user; empty until a profile is loaded.
    pub fn navigation(&self) -> Vec<Page> {
        self.state().role().map(navigation_for).unwrap_or_default()
    }

    pub fn dashboard(&self) -> Option<Dashboard> {
        self.state().profile.as_ref().map(Dashboard::for_profile)
    }

    pub fn shutdown(&self) {
        self.auth.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Route;
    use crate::config::DeployEnv;

    #[test]
    fn missing_config_starts_in_setup_mode() {
        let app = tokio_test::block_on(App::start(ServiceConfig::default())).unwrap();

        assert!(!app.state().setup.is_ready());
        assert_eq!(app.entry(), GuardDecision::Redirect(Route::Setup));
        assert_eq!(
            app.check(Page::Students),
            GuardDecision::Redirect(Route::Setup)
        );
        assert!(matches!(app.hub(), Err(Error::NotConfigured { .. })));
        assert!(app.navigation().is_empty());
        assert!(!app.auth().is_listening());
    }

    #[tokio::test]
    async fn configured_without_session_sends_to_sign_in() {
        let config = ServiceConfig::new("http://127.0.0.1:9", "anon-key")
            .with_deploy_env(DeployEnv::Development);
        let app = App::start(config).await.unwrap();

        assert!(app.hub().is_ok());
        assert!(app.auth().is_listening());
        assert_eq!(app.entry(), GuardDecision::Redirect(Route::SignIn));
        assert_eq!(
            app.check_path("/dashboard/profile").unwrap(),
            GuardDecision::Redirect(Route::SignIn)
        );
        assert!(app.check_path("/nowhere").is_err());
        assert!(app.dashboard().is_none());

        app.shutdown();
        assert!(!app.auth().is_listening());
    }
}
