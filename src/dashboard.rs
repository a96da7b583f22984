//! Role-specific dashboards

use crate::access::{Page, Role};
use crate::analytics::BASELINE_ATTENDANCE_RATE;
use crate::models::Profile;
use std::fmt;

/// One dashboard per role
#[derive(Debug, Clone, PartialEq)]
pub enum Dashboard {
    Admin(View),
    Teacher(View),
    Student(View),
    Parent(View),
}

/// Contents of a dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub welcome: String,
    pub subtitle: String,
    pub stats: Vec<StatCard>,
    pub quick_links: Vec<Page>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatCard {
    pub label: &'static str,
    pub value: String,
}

impl StatCard {
    fn new(label: &'static str, value: impl Into<String>) -> Self {
        Self {
            label,
            value: value.into(),
        }
    }
}

impl fmt::Display for StatCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.value)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "Welcome back, Jane!" or "Welcome back, User!" without a name.
pub fn welcome_line(profile: &Profile) -> String {
    format!("Welcome back, {}!", profile.first_name().unwrap_or("User"))
}

impl Dashboard {
    /// Builds the dashboard for the profile's role.
    pub fn for_profile(profile: &Profile) -> Self {
        let welcome = welcome_line(profile);
        let role = profile.role;
        let subtitle = format!(
            "{} Dashboard - Here's what's happening at your school today.",
            capitalize(role.as_str())
        );
        let view = |stats, links: &[Page]| View {
            welcome: welcome.clone(),
            subtitle: subtitle.clone(),
            stats,
            // never link to a page the guard would refuse
            quick_links: links
                .iter()
                .copied()
                .filter(|page| role.can_access(page.allowed_roles()))
                .collect(),
        };

        match role {
            Role::Admin => Dashboard::Admin(view(
                vec![
                    StatCard::new("Total Students", "1,247"),
                    StatCard::new("Total Teachers", "89"),
                    StatCard::new("Total Classes", "42"),
                    StatCard::new(
                        "Today's Attendance",
                        format!("{:.1}%", BASELINE_ATTENDANCE_RATE),
                    ),
                ],
                &[
                    Page::Students,
                    Page::Teachers,
                    Page::Attendance,
                    Page::Announcements,
                ],
            )),
            Role::Teacher => Dashboard::Teacher(view(
                vec![
                    StatCard::new("My Classes", "5"),
                    StatCard::new("Total Students", "142"),
                    StatCard::new("Today's Lectures", "6"),
                    StatCard::new("Pending Attendance", "2"),
                ],
                &[Page::Attendance, Page::Lectures, Page::Announcements],
            )),
            Role::Student => Dashboard::Student(view(
                vec![
                    StatCard::new("My Attendance", "92.5%"),
                    StatCard::new("Today's Classes", "6"),
                    StatCard::new("Assignments Due", "3"),
                    StatCard::new("Announcements", "2"),
                ],
                &[Page::Attendance, Page::Lectures, Page::Announcements],
            )),
            Role::Parent => Dashboard::Parent(view(
                vec![
                    StatCard::new("Child's Attendance", "89.2%"),
                    StatCard::new("Upcoming Events", "4"),
                    StatCard::new("New Announcements", "2"),
                    StatCard::new("Messages", "1"),
                ],
                &[Page::Attendance, Page::Announcements, Page::Lectures],
            )),
        }
    }

    pub fn view(&self) -> &View {
        match self {
            Dashboard::Admin(view)
            | Dashboard::Teacher(view)
            | Dashboard::Student(view)
            | Dashboard::Parent(view) => view,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Dashboard::Admin(_) => Role::Admin,
            Dashboard::Teacher(_) => Role::Teacher,
            Dashboard::Student(_) => Role::Student,
            Dashboard::Parent(_) => Role::Parent,
        }
    }
}
