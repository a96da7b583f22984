use super::pages::{Page, Route};
use super::role::Role;
use crate::session::AuthState;

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Nothing to show yet; render a neutral placeholder
    Pending,
    Allow,
    Redirect(Route),
}

impl GuardDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Gate for a protected page, optionally requiring one role.
///
/// Admin passes every role requirement.
pub fn require_auth(state: &AuthState, required: Option<Role>) -> GuardDecision {
    match required {
        Some(role) => require_any(state, &[role]),
        None => gate(state, |_| true),
    }
}

/// Gate for a page open to any of `roles`.
pub fn require_any(state: &AuthState, roles: &[Role]) -> GuardDecision {
    gate(state, |role| role.can_access(roles))
}

fn gate(state: &AuthState, permits: impl Fn(Role) -> bool) -> GuardDecision {
    // no redirect before loading finishes
    if state.loading {
        return GuardDecision::Pending;
    }
    if !state.setup.is_ready() {
        return GuardDecision::Redirect(Route::Setup);
    }
    if state.user.is_none() {
        return GuardDecision::Redirect(Route::SignIn);
    }
    let profile = match &state.profile {
        Some(profile) => profile,
        None => return GuardDecision::Pending,
    };
    if permits(profile.role) {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect(Route::Unauthorized)
    }
}

/// Where to send a caller arriving at the root.
pub fn entry_route(state: &AuthState) -> GuardDecision {
    if !state.setup.is_ready() {
        return GuardDecision::Redirect(Route::Setup);
    }
    if state.loading {
        return GuardDecision::Pending;
    }
    if state.user.is_some() {
        GuardDecision::Redirect(Route::Page(Page::Dashboard))
    } else {
        GuardDecision::Redirect(Route::SignIn)
    }
}
