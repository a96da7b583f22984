//! Seams between the session mirror and the external services

use crate::models::{tables, NewProfile, Profile, ProfilePatch};
use crate::SchoolHub;
use async_trait::async_trait;
use log::debug;
use schoolhub_auth::{AuthError, AuthStateChange, Session, SignUpResponse};
use schoolhub_postgrest::PostgrestError;
use tokio::sync::broadcast;

/// Identity operations the session mirror consumes
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stream of session changes for the lifetime of the provider.
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;

    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Profile rows keyed by user id
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, PostgrestError>;

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), PostgrestError>;

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch)
        -> Result<(), PostgrestError>;
}

#[async_trait]
impl IdentityProvider for SchoolHub {
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.auth.on_auth_state_change()
    }

    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        self.auth.current_session().await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.auth.sign_in_with_password(email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError> {
        self.auth.sign_up(email, password).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }
}

#[async_trait]
impl ProfileStore for SchoolHub {
    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, PostgrestError> {
        debug!("Fetching profile {}", user_id);
        self.from(tables::PROFILES)?
            .select("*")
            .eq("id", user_id)
            .single::<Profile>()
            .await
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), PostgrestError> {
        self.from(tables::PROFILES)?.insert(profile).await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        patch: &ProfilePatch,
    ) -> Result<(), PostgrestError> {
        self.from(tables::PROFILES)?
            .eq("id", user_id)
            .update(patch)
            .await?;
        Ok(())
    }
}
