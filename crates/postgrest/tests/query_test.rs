use reqwest::Client;
use schoolhub_postgrest::{PostgrestClient, PostgrestError, SortOrder};
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct Lecture {
    id: String,
    title: String,
}

fn client(uri: &str, table: &str) -> PostgrestClient {
    PostgrestClient::new(uri, "test_key", table, Client::new())
}

#[test]
fn test_filters_are_sent_as_query_params() {
    tokio_test::block_on(async {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/lectures"))
            .and(query_param("select", "id,title"))
            .and(query_param("status", "neq.cancelled"))
            .and(query_param("title", "ilike.*algebra*"))
            .and(query_param("class_id", "in.(c1,c2)"))
            .and(query_param("order", "scheduled_date.desc"))
            .and(query_param("limit", "2"))
            .and(header("apikey", "test_key"))
            .and(header("Authorization", "Bearer user_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "l1", "title": "Algebra I" },
                { "id": "l2", "title": "Algebra II" }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rows = client(&mock_server.uri(), "lectures")
            .with_auth("user_token")
            .unwrap()
            .select("id,title")
            .neq("status", "cancelled")
            .ilike("title", "*algebra*")
            .in_list("class_id", &["c1", "c2"])
            .order("scheduled_date", SortOrder::Descending)
            .limit(2)
            .execute::<Lecture>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "l1");
        assert_eq!(rows[1].title, "Algebra II");
    });
}

#[tokio::test]
async fn test_exact_count_is_read_from_content_range() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/students"))
        .and(header("prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "0-1/57")
                .set_body_json(json!([{ "id": "s1" }, { "id": "s2" }])),
        )
        .mount(&mock_server)
        .await;

    let counted = client(&mock_server.uri(), "students")
        .select("id")
        .count_exact()
        .execute_with_count::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(counted.rows.len(), 2);
    assert_eq!(counted.count, Some(57));
}

#[tokio::test]
async fn test_update_without_filter_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = client(&mock_server.uri(), "profiles")
        .select("*")
        .update(json!({ "phone": "+1-555-0100" }))
        .await;

    assert!(matches!(result, Err(PostgrestError::InvalidParameters(_))));
}

#[tokio::test]
async fn test_api_error_keeps_status_and_details() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"profiles_pkey\"",
            "details": "Key (id)=(u1) already exists.",
            "hint": null
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server.uri(), "profiles")
        .insert(json!({ "id": "u1", "email": "a@school.com", "role": "student" }))
        .await
        .unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(409));
    match err {
        PostgrestError::ApiError { details, .. } => {
            assert_eq!(details.code.as_deref(), Some("23505"));
        }
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[test]
fn test_invalid_header_is_an_error() {
    let result = client("http://localhost:54321", "profiles").with_header("X-Bad", "line\nbreak");
    assert!(matches!(result, Err(PostgrestError::InvalidParameters(_))));
}
