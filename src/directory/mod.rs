//! List loaders for the school collections
//!
//! A failed fetch is logged and shows up as an empty list; pages never see
//! the error.

mod filters;

pub use filters::{
    attendance_on, teacher_departments, AnnouncementFilter, AttendanceSummary, LectureFilter,
    LectureWindow,
};

use crate::access::Role;
use crate::models::{
    tables, Announcement, Attendance, Class, Lecture, Profile, School, Student, Subject, Teacher,
};
use crate::SchoolHub;
use log::{debug, error};
use schoolhub_postgrest::{PostgrestError, SortOrder};
use serde::de::DeserializeOwned;

async fn fetch_rows<T: DeserializeOwned>(
    hub: &SchoolHub,
    table: &str,
    columns: &str,
    order_by: &str,
    order: SortOrder,
) -> Result<Vec<T>, PostgrestError> {
    hub.from(table)?
        .select(columns)
        .order(order_by, order)
        .execute::<T>()
        .await
}

async fn load_rows<T: DeserializeOwned>(
    hub: &SchoolHub,
    table: &str,
    columns: &str,
    order_by: &str,
    order: SortOrder,
) -> Vec<T> {
    match fetch_rows(hub, table, columns, order_by, order).await {
        Ok(rows) => {
            debug!("Loaded {} rows from {}", rows.len(), table);
            rows
        }
        Err(e) => {
            error!("Error fetching {}: {}", table, e);
            Vec::new()
        }
    }
}

pub async fn schools(hub: &SchoolHub) -> Vec<School> {
    load_rows(hub, tables::SCHOOLS, "*", "name", SortOrder::Ascending).await
}

pub async fn subjects(hub: &SchoolHub) -> Vec<Subject> {
    load_rows(hub, tables::SUBJECTS, "*", "name", SortOrder::Ascending).await
}

pub async fn classes(hub: &SchoolHub) -> Vec<Class> {
    load_rows(hub, tables::CLASSES, "*", "name", SortOrder::Ascending).await
}

pub async fn students(hub: &SchoolHub) -> Vec<Student> {
    load_rows(
        hub,
        tables::STUDENTS,
        "*, classes(name)",
        "created_at",
        SortOrder::Descending,
    )
    .await
}

pub async fn teachers(hub: &SchoolHub) -> Vec<Teacher> {
    load_rows(hub, tables::TEACHERS, "*", "created_at", SortOrder::Descending).await
}

pub async fn attendance(hub: &SchoolHub) -> Vec<Attendance> {
    load_rows(hub, tables::ATTENDANCE, "*", "date", SortOrder::Descending).await
}

/// Lectures with subject and class names embedded.
pub async fn lectures(hub: &SchoolHub) -> Vec<Lecture> {
    load_rows(
        hub,
        tables::LECTURES,
        "*, subjects(name), classes(name)",
        "scheduled_date",
        SortOrder::Ascending,
    )
    .await
}

pub async fn announcements(hub: &SchoolHub) -> Vec<Announcement> {
    load_rows(
        hub,
        tables::ANNOUNCEMENTS,
        "*",
        "created_at",
        SortOrder::Descending,
    )
    .await
}

/// Role-specific record shown on the profile page
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileDetails {
    Student(Student),
    Teacher(Teacher),
    None,
}

/// Loads the student or teacher row that belongs to `profile`.
pub async fn profile_details(hub: &SchoolHub, profile: &Profile) -> ProfileDetails {
    let result = match profile.role {
        Role::Student => fetch_detail(hub, tables::STUDENTS, "*, classes(name)", &profile.id)
            .await
            .map(ProfileDetails::Student),
        Role::Teacher => fetch_detail(hub, tables::TEACHERS, "*", &profile.id)
            .await
            .map(ProfileDetails::Teacher),
        Role::Admin | Role::Parent => return ProfileDetails::None,
    };

    result.unwrap_or_else(|e| {
        error!("Error fetching {} details for {}: {}", profile.role, profile.id, e);
        ProfileDetails::None
    })
}

async fn fetch_detail<T: DeserializeOwned>(
    hub: &SchoolHub,
    table: &str,
    columns: &str,
    profile_id: &str,
) -> Result<T, PostgrestError> {
    hub.from(table)?
        .select(columns)
        .eq("profile_id", profile_id)
        .single::<T>()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile(role: Role) -> Profile {
        Profile {
            id: "u3".into(),
            email: "student@school.com".into(),
            full_name: Some("Jane Doe".into()),
            role,
            avatar_url: None,
            phone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subjects_are_loaded_in_name_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/subjects"))
            .and(query_param("order", "name.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "s1", "school_id": "school", "name": "English", "code": "ENG101", "credits": 4 },
                { "id": "s2", "school_id": "school", "name": "History", "code": "HIST101", "credits": 3 }
            ])))
            .mount(&mock_server)
            .await;

        let hub = SchoolHub::new(&mock_server.uri(), "anon").unwrap();
        let rows = subjects(&hub).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].credits, Some(3));
    }

    #[tokio::test]
    async fn fetch_errors_become_empty_lists() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/lectures"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let hub = SchoolHub::new(&mock_server.uri(), "anon").unwrap();
        assert!(lectures(&hub).await.is_empty());
    }

    #[tokio::test]
    async fn student_details_include_class_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/students"))
            .and(query_param("profile_id", "eq.u3"))
            .and(query_param("select", "*, classes(name)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "st1",
                "profile_id": "u3",
                "school_id": "school",
                "class_id": "c1",
                "student_id": "STU001",
                "admission_date": "2024-08-15",
                "classes": { "name": "10-A" }
            })))
            .mount(&mock_server)
            .await;

        let hub = SchoolHub::new(&mock_server.uri(), "anon").unwrap();
        match profile_details(&hub, &profile(Role::Student)).await {
            ProfileDetails::Student(student) => assert_eq!(student.class_name(), Some("10-A")),
            other => panic!("Expected student details, got {:?}", other),
        }
        assert_eq!(
            profile_details(&hub, &profile(Role::Parent)).await,
            ProfileDetails::None
        );
    }

    #[tokio::test]
    async fn missing_teacher_row_has_no_details() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/teachers"))
            .respond_with(ResponseTemplate::new(406).set_body_json(json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned"
            })))
            .mount(&mock_server)
            .await;

        let hub = SchoolHub::new(&mock_server.uri(), "anon").unwrap();
        assert_eq!(
            profile_details(&hub, &profile(Role::Teacher)).await,
            ProfileDetails::None
        );
    }
}
