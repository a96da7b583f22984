//! Demo data for development projects
//!
//! Seeds one school with subjects, classes, four demo identities (one per
//! role) and a couple of announcements. Runs with the service role key and
//! is refused outside development unless the shared setup key is presented.

use crate::access::Role;
use crate::config::{DeployEnv, ServiceConfig};
use crate::error::{Error, Result};
use crate::models::{
    tables, Announcement, Audience, Class, NewProfile, NewProfileFields, ParentStudent, Priority,
    School, Student, Subject, Teacher,
};
use crate::util::academic_year;
use crate::SchoolHub;
use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub const DEMO_SCHOOL_ID: &str = "550e8400-e29b-41d4-a716-446655440000";

/// A demo identity and the profile it gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoUser {
    pub email: &'static str,
    pub password: &'static str,
    pub role: Role,
    pub full_name: &'static str,
    pub phone: &'static str,
}

pub const DEMO_USERS: [DemoUser; 4] = [
    DemoUser {
        email: "admin@school.com",
        password: "admin123",
        role: Role::Admin,
        full_name: "Admin User",
        phone: "+1-555-0001",
    },
    DemoUser {
        email: "teacher@school.com",
        password: "teacher123",
        role: Role::Teacher,
        full_name: "John Smith",
        phone: "+1-555-0002",
    },
    DemoUser {
        email: "student@school.com",
        password: "student123",
        role: Role::Student,
        full_name: "Jane Doe",
        phone: "+1-555-0003",
    },
    DemoUser {
        email: "parent@school.com",
        password: "parent123",
        role: Role::Parent,
        full_name: "Robert Doe",
        phone: "+1-555-0004",
    },
];

// (name, code, description, credits)
const DEMO_SUBJECTS: [(&str, &str, &str, i32); 5] = [
    ("Mathematics", "MATH101", "Algebra and Geometry", 4),
    ("English", "ENG101", "Literature and Writing", 4),
    ("Science", "SCI101", "Physics and Chemistry", 4),
    ("History", "HIST101", "World History", 3),
    ("Computer Science", "CS101", "Programming Basics", 4),
];

// (id, name, grade level, section)
const DEMO_CLASSES: [(&str, &str, &str, &str); 3] = [
    ("550e8400-e29b-41d4-a716-446655440101", "10-A", "10th Grade", "A"),
    ("550e8400-e29b-41d4-a716-446655440102", "11-B", "11th Grade", "B"),
    ("550e8400-e29b-41d4-a716-446655440103", "9-C", "9th Grade", "C"),
];

const CLASS_CAPACITY: i32 = 30;

/// Checks whether seeding may run.
///
/// Development projects always may; elsewhere the caller must present the
/// configured setup key.
pub fn authorize(config: &ServiceConfig, presented_key: Option<&str>) -> Result<()> {
    if config.deploy_env == DeployEnv::Development {
        return Ok(());
    }
    match presented_key {
        Some(key) if key == config.demo_setup_key() => Ok(()),
        _ => Err(Error::unauthorized(
            "demo setup needs a development project or the setup key",
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededUser {
    pub role: Role,
    pub email: String,
    pub id: String,
}

/// Outcome of a seeding run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: Vec<SeededUser>,
    /// Emails of demo users that could not be created
    pub failed: Vec<String>,
}

impl SeedReport {
    pub fn user_id(&self, role: Role) -> Option<&str> {
        self.users
            .iter()
            .find(|user| user.role == role)
            .map(|user| user.id.as_str())
    }
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Demo data setup completed")?;
        for user in &DEMO_USERS {
            if self.users.iter().any(|seeded| seeded.email == user.email) {
                writeln!(f, "  {:<8} {} / {}", user.role, user.email, user.password)?;
            }
        }
        for email in &self.failed {
            writeln!(f, "  failed   {}", email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

pub struct DemoSeeder<'a> {
    hub: &'a SchoolHub,
    today: NaiveDate,
}

impl<'a> DemoSeeder<'a> {
    /// Needs a client holding the service role key.
    pub fn new(hub: &'a SchoolHub) -> Result<Self> {
        hub.admin()?;
        Ok(Self {
            hub,
            today: Utc::now().date_naive(),
        })
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Seeds everything. Only a failed school write aborts the run.
    pub async fn run(&self) -> Result<SeedReport> {
        self.seed_school().await?;
        self.seed_subjects().await;
        self.seed_classes().await;

        let report = self.seed_users().await;

        if let Some(teacher_id) = report.user_id(Role::Teacher) {
            self.seed_teacher(teacher_id).await;
        }
        let student_row = match report.user_id(Role::Student) {
            Some(student_id) => self.seed_student(student_id).await,
            None => None,
        };
        if let (Some(parent_id), Some(student_row)) = (report.user_id(Role::Parent), student_row) {
            self.link_parent(parent_id, &student_row).await;
        }
        if let Some(admin_id) = report.user_id(Role::Admin) {
            self.seed_announcements(admin_id).await;
        }

        info!(
            "Demo data ready: {} users seeded, {} failed",
            report.users.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn seed_school(&self) -> Result<()> {
        let school = School {
            id: DEMO_SCHOOL_ID.to_string(),
            name: "Demo High School".to_string(),
            address: Some("123 Education Avenue, Learning City, LC 12345".to_string()),
            phone: Some("+1-555-DEMO".to_string()),
            email: Some("info@demohigh.edu".to_string()),
            website: Some("https://demohigh.edu".to_string()),
            logo_url: None,
            created_at: None,
            updated_at: None,
        };

        self.hub
            .service_from(tables::SCHOOLS)?
            .upsert(&school)
            .await
            .map_err(|e| {
                error!("School creation failed: {}", e);
                Error::from(e)
            })?;
        info!("Seeded school {}", school.name);
        Ok(())
    }

    async fn seed_subjects(&self) {
        for (name, code, description, credits) in DEMO_SUBJECTS {
            let id = self
                .existing_id(tables::SUBJECTS, &[("school_id", DEMO_SCHOOL_ID), ("code", code)])
                .await;
            let subject = Subject {
                id: id_or_new(id),
                school_id: DEMO_SCHOOL_ID.to_string(),
                name: name.to_string(),
                code: code.to_string(),
                description: Some(description.to_string()),
                credits: Some(credits),
                created_at: None,
                updated_at: None,
            };
            self.upsert_logged(tables::SUBJECTS, &subject, code).await;
        }
    }

    async fn seed_classes(&self) {
        let year = academic_year(self.today);
        for (id, name, grade_level, section) in DEMO_CLASSES {
            let class = Class {
                id: id.to_string(),
                school_id: DEMO_SCHOOL_ID.to_string(),
                name: name.to_string(),
                grade_level: grade_level.to_string(),
                section: Some(section.to_string()),
                academic_year: year.clone(),
                teacher_id: None,
                max_students: Some(CLASS_CAPACITY),
                created_at: None,
                updated_at: None,
            };
            self.upsert_logged(tables::CLASSES, &class, name).await;
        }
    }

    async fn seed_users(&self) -> SeedReport {
        let mut report = SeedReport::default();
        let admin = match self.hub.admin() {
            Ok(admin) => admin,
            Err(e) => {
                error!("Cannot create demo users: {}", e);
                report.failed = DEMO_USERS.iter().map(|u| u.email.to_string()).collect();
                return report;
            }
        };

        let existing: HashMap<String, String> = match admin.list_users(Some(1), Some(1000)).await {
            Ok(users) => users
                .into_iter()
                .filter_map(|user| user.email.map(|email| (email, user.id)))
                .collect(),
            Err(e) => {
                warn!("Could not list existing users: {}", e);
                HashMap::new()
            }
        };

        for user in &DEMO_USERS {
            let id = match existing.get(user.email) {
                Some(id) => {
                    debug!("User {} already exists", user.email);
                    id.clone()
                }
                None => match admin
                    .create_user(user.email, Some(user.password), None, true)
                    .await
                {
                    Ok(created) => created.id,
                    Err(e) => {
                        error!("Failed to create user {}: {}", user.email, e);
                        report.failed.push(user.email.to_string());
                        continue;
                    }
                },
            };

            let profile = NewProfile::new(
                &id,
                user.email,
                NewProfileFields {
                    full_name: Some(user.full_name.to_string()),
                    role: user.role,
                    phone: Some(user.phone.to_string()),
                },
            );
            self.upsert_logged(tables::PROFILES, &profile, user.email)
                .await;

            report.users.push(SeededUser {
                role: user.role,
                email: user.email.to_string(),
                id,
            });
        }
        report
    }

    async fn seed_teacher(&self, profile_id: &str) {
        let id = self
            .existing_id(tables::TEACHERS, &[("profile_id", profile_id)])
            .await;
        let teacher = Teacher {
            id: id_or_new(id),
            profile_id: profile_id.to_string(),
            school_id: DEMO_SCHOOL_ID.to_string(),
            employee_id: "TCH001".to_string(),
            department: Some("Mathematics".to_string()),
            qualification: Some("M.Sc. Mathematics".to_string()),
            experience_years: None,
            salary: None,
            hire_date: date(2023, 8, 1),
            address: Some("456 Teacher Lane, Learning City, LC 12345".to_string()),
            emergency_contact: None,
            created_at: None,
            updated_at: None,
        };
        self.upsert_logged(tables::TEACHERS, &teacher, "TCH001")
            .await;
    }

    /// Returns the student row id on success.
    async fn seed_student(&self, profile_id: &str) -> Option<String> {
        let id = id_or_new(
            self.existing_id(tables::STUDENTS, &[("profile_id", profile_id)])
                .await,
        );
        let student = Student {
            id: id.clone(),
            profile_id: profile_id.to_string(),
            school_id: DEMO_SCHOOL_ID.to_string(),
            class_id: Some(DEMO_CLASSES[0].0.to_string()),
            student_id: "STU001".to_string(),
            admission_date: date(2024, 8, 15),
            date_of_birth: Some(date(2008, 5, 15)),
            gender: Some("Female".to_string()),
            address: Some("789 Student Street, Learning City, LC 12345".to_string()),
            guardian_name: Some("Robert Doe".to_string()),
            guardian_phone: Some("+1-555-0004".to_string()),
            guardian_email: Some("parent@school.com".to_string()),
            emergency_contact: None,
            medical_info: None,
            classes: None,
            created_at: None,
            updated_at: None,
        };
        self.upsert_logged(tables::STUDENTS, &student, "STU001")
            .await
            .then_some(id)
    }

    async fn link_parent(&self, parent_id: &str, student_row: &str) {
        let linked = self
            .existing_id(
                tables::PARENT_STUDENTS,
                &[("parent_id", parent_id), ("student_id", student_row)],
            )
            .await;
        if linked.is_some() {
            debug!("Parent link already present");
            return;
        }
        let link = ParentStudent {
            parent_id: parent_id.to_string(),
            student_id: student_row.to_string(),
            relationship: "father".to_string(),
            is_primary: true,
        };
        self.upsert_logged(tables::PARENT_STUDENTS, &link, "parent link")
            .await;
    }

    async fn seed_announcements(&self, author_id: &str) {
        let items = [
            (
                "Welcome to Demo School!",
                "Welcome to our School Management System demo. Explore all the features available for your role.",
                Audience::All,
                Priority::High,
            ),
            (
                "Parent Meeting Scheduled",
                "Monthly parent-teacher meeting is scheduled for next Friday at 3 PM.",
                Audience::Parents,
                Priority::Medium,
            ),
        ];

        for (title, content, audience, priority) in items {
            let id = self
                .existing_id(
                    tables::ANNOUNCEMENTS,
                    &[("school_id", DEMO_SCHOOL_ID), ("title", title)],
                )
                .await;
            let announcement = Announcement {
                id: id_or_new(id),
                school_id: DEMO_SCHOOL_ID.to_string(),
                author_id: author_id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                target_audience: audience,
                class_id: None,
                priority,
                is_published: true,
                published_at: Some(Utc::now()),
                expires_at: None,
                created_at: None,
                updated_at: None,
            };
            self.upsert_logged(tables::ANNOUNCEMENTS, &announcement, title)
                .await;
        }
    }

    async fn existing_id(&self, table: &str, filters: &[(&str, &str)]) -> Option<String> {
        let mut query = match self.hub.service_from(table) {
            Ok(query) => query.select("id"),
            Err(e) => {
                warn!("Cannot query {}: {}", table, e);
                return None;
            }
        };
        for (column, value) in filters {
            query = query.eq(column, value);
        }

        match query.limit(1).execute::<IdRow>().await {
            Ok(rows) => rows.into_iter().next().map(|row| row.id),
            Err(e) => {
                warn!("Lookup in {} failed: {}", table, e);
                None
            }
        }
    }

    async fn upsert_logged<T: Serialize>(&self, table: &str, row: &T, what: &str) -> bool {
        let result = match self.hub.service_from(table) {
            Ok(query) => query.upsert(row).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {
                debug!("Seeded {} into {}", what, table);
                true
            }
            Err(e) => {
                error!("Failed to seed {} into {}: {}", what, table, e);
                false
            }
        }
    }
}

fn id_or_new(existing: Option<String>) -> String {
    existing.unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hub(uri: &str) -> SchoolHub {
        SchoolHub::new(uri, "anon")
            .unwrap()
            .with_service_role_key("service")
    }

    #[test]
    fn development_needs_no_key() {
        let config = ServiceConfig::new("https://abc.supabase.co", "anon")
            .with_deploy_env(DeployEnv::Development);
        assert!(authorize(&config, None).is_ok());
    }

    #[test]
    fn production_needs_the_setup_key() {
        let config = ServiceConfig::new("https://abc.supabase.co", "anon");
        assert!(matches!(authorize(&config, None), Err(Error::Unauthorized(_))));
        assert!(authorize(&config, Some("wrong")).is_err());
        assert!(authorize(&config, Some("demo-setup-key-123")).is_ok());

        let config = ServiceConfig {
            demo_setup_key: Some("s3cret".into()),
            ..config
        };
        assert!(authorize(&config, Some("demo-setup-key-123")).is_err());
        assert!(authorize(&config, Some("s3cret")).is_ok());
    }

    #[test]
    fn seeder_requires_service_key() {
        let plain = SchoolHub::new("http://localhost:9", "anon").unwrap();
        assert!(matches!(
            DemoSeeder::new(&plain),
            Err(Error::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn failed_user_is_skipped() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{ "id": "admin-id", "email": "admin@school.com" }]
            })))
            .mount(&mock_server)
            .await;

        for (email, id) in [("teacher@school.com", "teacher-id"), ("parent@school.com", "parent-id")] {
            Mock::given(method("POST"))
                .and(path("/auth/v1/admin/users"))
                .and(body_partial_json(json!({ "email": email, "email_confirm": true })))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({ "id": id, "email": email })),
                )
                .mount(&mock_server)
                .await;
        }

        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .and(body_partial_json(json!({ "email": "student@school.com" })))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "msg": "A user with this email address has already been registered"
            })))
            .mount(&mock_server)
            .await;

        // no student row means no parent link
        Mock::given(method("POST"))
            .and(path("/rest/v1/parent_students"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(201))
            .expect(3)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/rest/v1/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/rest/v1/.+$"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&mock_server)
            .await;

        let hub = hub(&mock_server.uri());
        let report = DemoSeeder::new(&hub).unwrap().run().await.unwrap();

        assert_eq!(report.user_id(Role::Admin), Some("admin-id"));
        assert_eq!(report.user_id(Role::Teacher), Some("teacher-id"));
        assert_eq!(report.user_id(Role::Parent), Some("parent-id"));
        assert_eq!(report.user_id(Role::Student), None);
        assert_eq!(report.failed, vec!["student@school.com".to_string()]);
        assert!(report.to_string().contains("teacher@school.com / teacher123"));
    }

    #[tokio::test]
    async fn school_failure_aborts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/schools"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Invalid API key"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/subjects"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&mock_server)
            .await;

        let hub = hub(&mock_server.uri());
        let err = DemoSeeder::new(&hub).unwrap().run().await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }
}
