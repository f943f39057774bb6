//! Error monitoring adapter against a mock HTTP backend

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use saas_adapters::ErrorKind;
use saas_adapters::app::Adapters;
use saas_adapters::bugsnag::BugsnagAdapter;
use saas_adapters::cache::ContextCache;
use saas_adapters::config::{BugsnagConfig, Config, HttpConfig};
use saas_adapters::pagination::PageRequest;
use saas_adapters::tools::DeclineAll;

const TOKEN: &str = "test-auth-token";

fn bugsnag_config(server: &MockServer, key: Option<&str>) -> BugsnagConfig {
    BugsnagConfig {
        auth_token: TOKEN.to_string(),
        project_api_key: key.map(str::to_string),
        endpoint: Some(server.uri()),
    }
}

fn adapter(server: &MockServer, key: Option<&str>) -> BugsnagAdapter {
    BugsnagAdapter::from_config(
        &bugsnag_config(server, key),
        &HttpConfig::default(),
        Arc::new(ContextCache::default()),
    )
    .unwrap()
}

async fn mount_context(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/user/organizations"))
        .and(header("authorization", format!("token {TOKEN}").as_str()))
        .and(header("x-version", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "org1", "name": "Acme", "slug": "acme"}
        ])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/organizations/org1/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "p1", "name": "Web", "api_key": "key-web"},
            {"id": "p2", "name": "Mobile", "api_key": "key-mobile",
             "stability_target_type": "user",
             "target_stability": {"value": 0.99},
             "critical_stability": {"value": 0.9}}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/projects/p2/event_fields"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"display_id": "error.status", "custom": false},
            {"display_id": "event.since", "custom": false},
            {"display_id": "app.release_stage", "custom": false},
            {"display_id": "search", "custom": false}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_errors_paginates_with_link_header() {
    let server = MockServer::start().await;
    mount_context(&server).await;

    let next = format!("{}/projects/p2/errors?offset=2&per_page=2", server.uri());
    Mock::given(method("GET"))
        .and(path("/projects/p2/errors"))
        .and(query_param("filters[error.status][][type]", "eq"))
        .and(query_param("filters[error.status][][value]", "open"))
        .and(query_param("filters[event.since][][value]", "30d"))
        .and(query_param("per_page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "e1"}, {"id": "e2"}]))
                .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str())
                .insert_header("X-Total-Count", "3"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/projects/p2/errors"))
        .and(query_param("offset", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "e3"}]))
                .insert_header("X-Total-Count", "3"),
        )
        .mount(&server)
        .await;

    let adapter = adapter(&server, Some("key-mobile"));
    adapter.initialize().await;

    let first = adapter
        .list_errors(
            None,
            PageRequest {
                per_page: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(first.data_count, 2);
    assert_eq!(first.total_count, Some(3));
    assert_eq!(first.next_cursor.as_deref(), Some(next.as_str()));

    let second = adapter
        .list_errors(
            None,
            PageRequest {
                next_cursor: first.next_cursor,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.data_count, 1);
    assert_eq!(second.data[0]["id"], "e3");
    assert_eq!(second.next_cursor, None);
}

#[tokio::test]
async fn test_update_with_empty_success_body_is_verified() {
    let server = MockServer::start().await;
    mount_context(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/projects/p1/errors/e9"))
        .and(body_json(json!({"operation": "snooze"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/projects/p1/errors/e9"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "e9", "status": "snoozed"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = Arc::new(adapter(&server, None));
    let entity = adapter
        .update_error(
            Some("p1"),
            "e9",
            saas_adapters::bugsnag::ErrorOperation::Snooze,
            None,
        )
        .await
        .unwrap();
    assert_eq!(entity["status"], "snoozed");
}

#[tokio::test]
async fn test_release_tool_adds_stability() {
    let server = MockServer::start().await;
    mount_context(&server).await;

    Mock::given(method("GET"))
        .and(path("/projects/p2/releases/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "r1",
            "app_version": "3.1.0",
            "accumulative_daily_users_seen": 200,
            "accumulative_daily_users_with_unhandled": 1,
            "total_sessions_count": 1000,
            "unhandled_sessions_count": 50
        })))
        .mount(&server)
        .await;

    let config = Config {
        bugsnag: Some(bugsnag_config(&server, Some("key-mobile"))),
        ..Default::default()
    };
    let adapters = Adapters::from_config(&config).unwrap();

    let release = adapters
        .registry()
        .call("bugsnag_get_release", json!({"release_id": "r1"}), &DeclineAll)
        .await
        .unwrap();

    assert_eq!(release["app_version"], "3.1.0");
    assert_eq!(release["stability_target_type"], "user");
    assert_eq!(release["user_stability"], 0.995);
    assert_eq!(release["meets_target_stability"], true);
    assert_eq!(release["session_stability"], 0.95);
}

#[tokio::test]
async fn test_startup_failure_is_contained() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/organizations"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let config = Config {
        bugsnag: Some(bugsnag_config(&server, Some("key-web"))),
        ..Default::default()
    };
    let adapters = Adapters::from_config(&config).unwrap();
    adapters.initialize().await;

    let err = adapters
        .registry()
        .call("bugsnag_list_projects", Value::Null, &DeclineAll)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_unknown_error_is_not_found() {
    let server = MockServer::start().await;
    mount_context(&server).await;

    Mock::given(method("GET"))
        .and(path("/projects/p1/errors/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": ["Not found"]})))
        .mount(&server)
        .await;

    let err = adapter(&server, None)
        .get_error(Some("p1"), "missing")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
