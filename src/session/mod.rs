//! Local mirror of the remote session
//!
//! [`AuthContext`] makes one attempt to restore a session at start, then
//! follows the identity provider's change stream for its whole lifetime. Each
//! change is published through a `watch` channel as an [`AuthState`] that the
//! guard reads.

mod provider;

pub use provider::{IdentityProvider, ProfileStore};

use crate::access::Role;
use crate::config::{ClientOptions, SetupStatus};
use crate::error::{Error, Result};
use crate::models::{next_stamp, NewProfile, NewProfileFields, Profile, ProfilePatch, ProfileUpdate};
use crate::util::validate_email;
use crate::SchoolHub;
use log::{debug, error, info, warn};
use schoolhub_auth::{AuthStateChange, Session, SignUpResponse, User};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Shortest password accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// What the guard sees
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub setup: SetupStatus,
    pub session: Option<Session>,
    pub user: Option<User>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl Default for AuthState {
    /// Configured, nothing known yet.
    fn default() -> Self {
        Self {
            setup: SetupStatus::Ready,
            session: None,
            user: None,
            profile: None,
            loading: true,
        }
    }
}

impl AuthState {
    pub fn signed_out() -> Self {
        Self {
            loading: false,
            ..Default::default()
        }
    }

    pub fn needs_setup(missing: Vec<String>) -> Self {
        Self {
            setup: SetupStatus::NeedsSetup { missing },
            loading: false,
            ..Default::default()
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }

    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|profile| profile.role)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.access_token.as_str())
    }
}

struct Backends {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
}

struct Shared {
    backends: Option<Backends>,
    state: watch::Sender<AuthState>,
    generation: AtomicU64,
}

impl Shared {
    /// Starts a new session change; earlier in-flight work becomes stale.
    fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Applies `update` unless a newer session change has started.
    fn publish(&self, generation: u64, update: impl FnOnce(&mut AuthState)) -> bool {
        let applied = self.state.send_if_modified(|state| {
            if self.current_generation() != generation {
                return false;
            }
            update(state);
            true
        });
        if !applied {
            debug!("Discarding stale session update (generation {})", generation);
        }
        applied
    }

    async fn load_profile(&self, user_id: &str) -> Option<Profile> {
        let backends = self.backends.as_ref()?;
        if user_id.is_empty() {
            error!("Cannot load a profile without a user id");
            return None;
        }

        match backends.profiles.fetch_profile(user_id).await {
            Ok(profile) => {
                debug!("Loaded profile {} ({})", profile.id, profile.role);
                Some(profile)
            }
            Err(e) => {
                error!("Error fetching profile for {}: {}", user_id, e);
                None
            }
        }
    }

    async fn apply_session(&self, generation: u64, session: Option<Session>) {
        let session = match session {
            Some(session) => session,
            None => {
                self.publish(generation, |state| {
                    state.session = None;
                    state.user = None;
                    state.profile = None;
                    state.loading = false;
                });
                return;
            }
        };

        let user = session.user.clone();
        let user_id = user.id.clone();
        let started = self.publish(generation, |state| {
            if state.user_id() != Some(user_id.as_str()) {
                state.profile = None;
            }
            state.session = Some(session);
            state.user = Some(user);
            state.loading = true;
        });
        if !started {
            return;
        }

        let profile = self.load_profile(&user_id).await;
        self.publish(generation, |state| {
            state.profile = newest(state.profile.take(), profile);
            state.loading = false;
        });
    }

    async fn resync(&self, generation: u64) {
        let session = match &self.backends {
            Some(backends) => backends
                .identity
                .current_session()
                .await
                .unwrap_or_else(|e| {
                    warn!("Could not re-read session: {}", e);
                    None
                }),
            None => None,
        };
        self.apply_session(generation, session).await;
    }
}

/// Picks `fetched` unless the cache already holds a later write of the same row.
///
/// A fetch that started before a profile update can finish after it.
fn newest(cached: Option<Profile>, fetched: Option<Profile>) -> Option<Profile> {
    match (cached, fetched) {
        (Some(cached), Some(fetched))
            if cached.id == fetched.id && cached.updated_at > fetched.updated_at =>
        {
            debug!("Keeping profile {} written at {}", cached.id, cached.updated_at);
            Some(cached)
        }
        (_, fetched) => fetched,
    }
}

async fn listen(shared: Arc<Shared>, mut events: broadcast::Receiver<AuthStateChange>) {
    loop {
        match events.recv().await {
            Ok(change) => {
                debug!("Session change: {:?}", change.event);
                let generation = shared.advance();
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    shared.apply_session(generation, change.session).await;
                });
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} session changes, re-reading session", skipped);
                let generation = shared.advance();
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    shared.resync(generation).await;
                });
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Session change stream closed");
                break;
            }
        }
    }
}

/// Application auth state with an explicit start and shutdown
pub struct AuthContext {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
    settle_timeout: Duration,
}

impl AuthContext {
    /// Restores any existing session and starts following session changes.
    ///
    /// An unreachable provider degrades to "no session".
    pub async fn start(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        settle_timeout: Duration,
    ) -> Self {
        let events = identity.subscribe();
        let (state, _) = watch::channel(AuthState::default());
        let shared = Arc::new(Shared {
            backends: Some(Backends {
                identity: Arc::clone(&identity),
                profiles,
            }),
            state,
            generation: AtomicU64::new(0),
        });

        let generation = shared.advance();
        let session = identity.current_session().await.unwrap_or_else(|e| {
            warn!("Could not restore session: {}", e);
            None
        });
        shared.apply_session(generation, session).await;

        let listener = tokio::spawn(listen(Arc::clone(&shared), events));
        info!("Session listener started");

        Self {
            shared,
            listener: Mutex::new(Some(listener)),
            settle_timeout,
        }
    }

    /// Starts against a connected client.
    pub async fn connect(hub: Arc<SchoolHub>, options: &ClientOptions) -> Self {
        let identity: Arc<dyn IdentityProvider> = hub.clone();
        let profiles: Arc<dyn ProfileStore> = hub;
        Self::start(identity, profiles, options.settle_timeout).await
    }

    /// State for a missing configuration: no provider is ever contacted.
    pub fn unconfigured(missing: Vec<String>) -> Self {
        warn!("Service not configured, missing: {}", missing.join(", "));
        let (state, _) = watch::channel(AuthState::needs_setup(missing));
        Self {
            shared: Arc::new(Shared {
                backends: None,
                state,
                generation: AtomicU64::new(0),
            }),
            listener: Mutex::new(None),
            settle_timeout: Duration::ZERO,
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.state.subscribe()
    }

    /// Waits until loading has finished.
    pub async fn settled(&self) -> Result<AuthState> {
        self.wait_until("session to settle", |state| !state.loading)
            .await
    }

    async fn wait_until(
        &self,
        what: &str,
        ready: impl FnMut(&AuthState) -> bool,
    ) -> Result<AuthState> {
        let mut rx = self.shared.state.subscribe();
        let settled = match tokio::time::timeout(self.settle_timeout, rx.wait_for(ready)).await {
            Ok(Ok(state)) => Ok((*state).clone()),
            Ok(Err(_)) | Err(_) => Err(Error::timeout(what)),
        };
        settled
    }

    fn backends(&self) -> Result<&Backends> {
        self.shared.backends.as_ref().ok_or_else(|| {
            let missing = match &self.shared.state.borrow().setup {
                SetupStatus::NeedsSetup { missing } => missing.clone(),
                SetupStatus::Ready => Vec::new(),
            };
            Error::NotConfigured { missing }
        })
    }

    /// Signs in and waits until the user's profile has been loaded.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthState> {
        let backends = self.backends()?;
        let session = backends.identity.sign_in(email.trim(), password).await?;
        let token = session.access_token;

        // the same user may already be cached under an older token
        self.wait_until("sign-in to settle", |state| {
            !state.loading && state.access_token() == Some(token.as_str())
        })
        .await
    }

    /// Creates an identity and its profile row.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        fields: NewProfileFields,
    ) -> Result<SignUpResponse> {
        let backends = self.backends()?;
        let email = email.trim();
        if !validate_email(email) {
            return Err(Error::invalid_input("invalid email address"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::invalid_input(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let response = backends.identity.sign_up(email, password).await?;
        let user_id = response.user().id.clone();
        let token = response.session().map(|session| session.access_token.clone());

        let profile = NewProfile::new(&user_id, email, fields);
        if let Err(e) = backends.profiles.insert_profile(&profile).await {
            error!("Error creating profile for {}: {}", email, e);
            return Err(e.into());
        }
        info!("Created profile {} ({})", user_id, profile.role);

        if let Some(token) = token {
            // the listener may have looked for the profile before it existed
            let state = self
                .wait_until("sign-up to settle", |state| {
                    !state.loading && state.access_token() == Some(token.as_str())
                })
                .await?;
            if state.profile.is_none() {
                self.refresh_profile().await?;
            }
        }

        Ok(response)
    }

    pub async fn sign_out(&self) -> Result<AuthState> {
        let backends = self.backends()?;
        backends.identity.sign_out().await?;
        self.wait_until("sign-out to settle", |state| state.user.is_none())
            .await
    }

    /// Persists `update` for the active user, then merges it into the cache.
    ///
    /// The cache is only touched after the store accepted the write, so a
    /// rejected update leaves it exactly as it was.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let backends = self.backends()?;
        let current = self.snapshot();
        let user_id = current.user_id().ok_or(Error::NotSignedIn)?.to_string();
        if update.is_empty() {
            return Err(Error::invalid_input("profile update has no fields"));
        }

        let previous = current
            .profile
            .as_ref()
            .filter(|profile| profile.id == user_id)
            .map(|profile| profile.updated_at);
        let stamp = next_stamp(previous);
        let patch = ProfilePatch {
            fields: update,
            updated_at: stamp,
        };

        backends.profiles.update_profile(&user_id, &patch).await?;
        debug!("Updated profile {}", user_id);

        let mut merged = None;
        self.shared.state.send_if_modified(|state| match &mut state.profile {
            Some(profile) if profile.id == user_id => {
                patch.fields.apply_to(profile, stamp);
                merged = Some(profile.clone());
                true
            }
            _ => false,
        });

        match merged {
            Some(profile) => Ok(profile),
            // nothing cached yet; read back what the store now holds
            None => Ok(backends.profiles.fetch_profile(&user_id).await?),
        }
    }

    /// Re-reads the active user's profile.
    pub async fn refresh_profile(&self) -> Result<Option<Profile>> {
        self.backends()?;
        let user_id = self
            .snapshot()
            .user_id()
            .ok_or(Error::NotSignedIn)?
            .to_string();

        let generation = self.shared.current_generation();
        let profile = self.shared.load_profile(&user_id).await;
        let fresh = profile.clone();
        self.shared.publish(generation, move |state| {
            state.profile = newest(state.profile.take(), fresh)
        });
        Ok(profile)
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stops following session changes and drops in-flight profile loads.
    pub fn shutdown(&self) {
        self.shared.advance();
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Session listener stopped");
        }
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
