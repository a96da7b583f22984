//! Role-based access policy
//!
//! [`Role::can_access`] is the only authorization predicate; the guard, the
//! page table and navigation all go through it.

mod guard;
mod pages;
mod role;

pub use guard::{entry_route, require_any, require_auth, GuardDecision};
pub use pages::{check_page, navigation_for, Page, Route};
pub use role::Role;
