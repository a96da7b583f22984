use super::guard::{require_any, GuardDecision};
use super::role::Role;
use crate::session::AuthState;
use std::fmt;

use Role::{Admin, Parent, Student, Teacher};

const EVERYONE: &[Role] = &[Admin, Teacher, Student, Parent];
const STAFF: &[Role] = &[Admin, Teacher];
const ADMIN_ONLY: &[Role] = &[Admin];
const CLASSROOM: &[Role] = &[Admin, Teacher, Student];

/// Every dashboard page.
///
/// The same table feeds navigation and the page guard, so a page is shown
/// in the menu exactly when the guard lets the role in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Dashboard,
    Schools,
    Teachers,
    Students,
    Classes,
    Subjects,
    Attendance,
    Lectures,
    Announcements,
    Analytics,
    Profile,
    Settings,
}

impl Page {
    /// Navigation order.
    pub const ALL: [Page; 12] = [
        Page::Dashboard,
        Page::Schools,
        Page::Teachers,
        Page::Students,
        Page::Classes,
        Page::Subjects,
        Page::Attendance,
        Page::Lectures,
        Page::Announcements,
        Page::Analytics,
        Page::Profile,
        Page::Settings,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Page::Dashboard => "/dashboard",
            Page::Schools => "/dashboard/schools",
            Page::Teachers => "/dashboard/teachers",
            Page::Students => "/dashboard/students",
            Page::Classes => "/dashboard/classes",
            Page::Subjects => "/dashboard/subjects",
            Page::Attendance => "/dashboard/attendance",
            Page::Lectures => "/dashboard/lectures",
            Page::Announcements => "/dashboard/announcements",
            Page::Analytics => "/dashboard/analytics",
            Page::Profile => "/dashboard/profile",
            Page::Settings => "/dashboard/settings",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Schools => "Schools",
            Page::Teachers => "Teachers",
            Page::Students => "Students",
            Page::Classes => "Classes",
            Page::Subjects => "Subjects",
            Page::Attendance => "Attendance",
            Page::Lectures => "Lectures",
            Page::Announcements => "Announcements",
            Page::Analytics => "Analytics",
            Page::Profile => "Profile",
            Page::Settings => "Settings",
        }
    }

    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Page::Dashboard | Page::Attendance | Page::Announcements | Page::Profile => EVERYONE,
            Page::Lectures => CLASSROOM,
            Page::Schools | Page::Teachers | Page::Settings => ADMIN_ONLY,
            Page::Students | Page::Classes | Page::Subjects | Page::Analytics => STAFF,
        }
    }

    /// Looks a page up by path; a trailing slash is ignored.
    pub fn from_path(path: &str) -> Option<Page> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Page::ALL.into_iter().find(|page| page.path() == path)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Where the guard sends a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    SignUp,
    Unauthorized,
    Setup,
    Page(Page),
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::SignIn => "/auth/signin",
            Route::SignUp => "/auth/signup",
            Route::Unauthorized => "/unauthorized",
            Route::Setup => "/setup",
            Route::Page(page) => page.path(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Pages shown in the menu for `role`.
pub fn navigation_for(role: Role) -> Vec<Page> {
    Page::ALL
        .into_iter()
        .filter(|page| role.can_access(page.allowed_roles()))
        .collect()
}

/// Guard decision for rendering `page`.
pub fn check_page(state: &AuthState, page: Page) -> GuardDecision {
    require_any(state, page.allowed_roles())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_sees_every_page() {
        assert_eq!(navigation_for(Admin), Page::ALL.to_vec());
    }

    #[test]
    fn parent_navigation() {
        assert_eq!(
            navigation_for(Parent),
            vec![
                Page::Dashboard,
                Page::Attendance,
                Page::Announcements,
                Page::Profile
            ]
        );
    }

    #[test]
    fn teacher_navigation_excludes_admin_pages() {
        let pages = navigation_for(Teacher);
        assert!(pages.contains(&Page::Analytics));
        assert!(pages.contains(&Page::Lectures));
        assert!(!pages.contains(&Page::Schools));
        assert!(!pages.contains(&Page::Settings));
    }

    #[test]
    fn student_navigation() {
        let pages = navigation_for(Student);
        assert!(pages.contains(&Page::Lectures));
        assert!(!pages.contains(&Page::Students));
    }

    #[test]
    fn paths_round_trip() {
        for page in Page::ALL {
            assert_eq!(Page::from_path(page.path()), Some(page));
        }
        assert_eq!(Page::from_path("/dashboard/lectures/"), Some(Page::Lectures));
        assert_eq!(Page::from_path("/nowhere"), None);
        assert_eq!(Route::SignIn.to_string(), "/auth/signin");
    }
}
