use devassist_connectors::JiraConnector;
use devassist_core::{CollectError, Connector, ConnectorConfig};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH: &str = "Basic ZGV2OnRvaw==";

fn config(server: &MockServer) -> ConnectorConfig {
    json!({
        "url": format!("{}/", server.uri()),
        "username": "dev",
        "api_token": "tok",
        "projects": "OPS",
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn issue(key: &str, summary: &str) -> Value {
    json!({
        "id": format!("id-{key}"),
        "key": key,
        "fields": {
            "summary": summary,
            "status": {"name": "In Progress"},
            "priority": {"name": "High"},
            "assignee": {"displayName": "Dev One"},
            "issuetype": {"name": "Bug"},
            "labels": ["backend"],
            "updated": "2024-05-02T10:00:00.000+0000",
            "customfield_10002": 3
        }
    })
}

async fn search(server: &MockServer, jql: &str, issues: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/api/2/search"))
        .and(query_param("jql", jql))
        .and(header("authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": issues})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn collects_every_fragment() {
    let server = MockServer::start().await;
    search(
        &server,
        "assignee = 'dev' AND resolution = Unresolved ORDER BY priority DESC, updated DESC",
        json!([issue("OPS-1", "Fix deploy")]),
    )
    .await;
    search(
        &server,
        "watcher = 'dev' AND resolution = Unresolved ORDER BY updated DESC",
        json!([issue("OPS-2", "Flaky test")]),
    )
    .await;
    search(
        &server,
        "updatedBy = 'dev' OR commentedBy = 'dev' ORDER BY updated DESC",
        json!([issue("OPS-3", "Docs")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board"))
        .and(query_param("projectKeyOrId", "OPS"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"values": [{"id": 5, "name": "OPS board"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board/5/sprint"))
        .and(query_param("state", "active"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"values": [{"id": 42, "name": "Sprint 42"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/sprint/42/issue"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"issues": [issue("OPS-4", "Ship it")]})),
        )
        .mount(&server)
        .await;

    let mut connector = JiraConnector::new();
    connector.init(&config(&server)).await.unwrap();
    let snapshot = connector.collect().await.unwrap();

    let assigned = &snapshot["assigned_issues"][0];
    assert_eq!(assigned["key"], "OPS-1");
    assert_eq!(assigned["status"], "In Progress");
    assert_eq!(assigned["priority"], "High");
    assert_eq!(assigned["assignee"], "Dev One");
    assert_eq!(assigned["issue_type"], "Bug");
    assert_eq!(assigned["story_points"], 3);
    assert_eq!(assigned["url"], format!("{}/browse/OPS-1", server.uri()));
    assert!(assigned.get("sprint").is_none());

    assert_eq!(snapshot["watching_issues"][0]["key"], "OPS-2");
    assert_eq!(snapshot["sprint_issues"][0]["key"], "OPS-4");
    assert_eq!(snapshot["sprint_issues"][0]["sprint"], "Sprint 42");
    assert_eq!(
        snapshot["recent_activity"][0],
        json!({
            "id": "id-OPS-3",
            "key": "OPS-3",
            "summary": "Docs",
            "updated": "2024-05-02T10:00:00.000+0000",
            "type": "issue_update",
            "url": format!("{}/browse/OPS-3", server.uri()),
        })
    );
}

#[tokio::test]
async fn project_without_board_contributes_no_sprint_issues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": []})))
        .mount(&server)
        .await;

    let mut connector = JiraConnector::new();
    connector.init(&config(&server)).await.unwrap();
    let snapshot = connector.collect().await.unwrap();

    assert_eq!(
        snapshot,
        json!({
            "assigned_issues": [],
            "watching_issues": [],
            "sprint_issues": [],
            "recent_activity": []
        })
    );
}

#[tokio::test]
async fn rejected_search_only_empties_that_fragment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/search"))
        .and(query_param(
            "jql",
            "watcher = 'dev' AND resolution = Unresolved ORDER BY updated DESC",
        ))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad jql"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"issues": [issue("OPS-9", "Other")]})),
        )
        .mount(&server)
        .await;

    let mut connector = JiraConnector::new();
    let mut cfg = config(&server);
    cfg.remove("projects");
    connector.init(&cfg).await.unwrap();
    let snapshot = connector.collect().await.unwrap();

    assert_eq!(snapshot["watching_issues"], json!([]));
    assert_eq!(snapshot["assigned_issues"][0]["key"], "OPS-9");
    assert_eq!(snapshot["recent_activity"][0]["key"], "OPS-9");
}

#[tokio::test]
async fn unreachable_server_is_a_collect_error() {
    let mut connector = JiraConnector::new();
    let config = json!({"url": "http://127.0.0.1:9", "username": "dev", "api_token": "tok"})
        .as_object()
        .cloned()
        .unwrap();
    connector.init(&config).await.unwrap();

    let err = connector.collect().await.unwrap_err();
    assert!(matches!(err, CollectError::Http(_)), "got {err:?}");
}

#[tokio::test]
async fn rejected_credentials_are_a_collect_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let mut connector = JiraConnector::new();
    connector.init(&config(&server)).await.unwrap();

    assert!(matches!(
        connector.collect().await,
        Err(CollectError::Unauthorized(_))
    ));
}
