//! Jira: issues assigned to or watched by the user, the active sprint of
//! each configured project, and recently touched issues.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use devassist_core::{CollectError, ConfigExt, Connector, ConnectorConfig, InitError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::http::{self, Fragments};

pub const NAME: &str = "jira";

const EPIC_LINK_FIELD: &str = "customfield_10014";
const STORY_POINTS_FIELD: &str = "customfield_10002";

#[derive(Debug, Deserialize)]
struct ApiIssue {
    id: String,
    key: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<ApiIssue>,
}

#[derive(Debug, Deserialize)]
struct AgileItem {
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AgilePage {
    #[serde(default)]
    values: Vec<AgileItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JiraIssue {
    pub id: String,
    pub key: String,
    pub summary: Option<String>,
    pub description: Option<Value>,
    pub status: String,
    pub priority: String,
    pub assignee: String,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub due_date: Option<String>,
    pub url: String,
    pub issue_type: String,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Activity {
    pub id: String,
    pub key: String,
    pub summary: Option<String>,
    pub updated: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
}

#[derive(Debug, Default, Serialize)]
pub struct JiraSnapshot {
    pub assigned_issues: Vec<JiraIssue>,
    pub watching_issues: Vec<JiraIssue>,
    pub sprint_issues: Vec<JiraIssue>,
    pub recent_activity: Vec<Activity>,
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `fields.<key>.<inner>` as a string, or `fallback`.
fn nested_name(fields: &Map<String, Value>, key: &str, inner: &str, fallback: &str) -> String {
    fields
        .get(key)
        .and_then(|v| v.get(inner))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn present(fields: &Map<String, Value>, key: &str) -> Option<Value> {
    fields.get(key).filter(|v| !v.is_null()).cloned()
}

/// Quote a value for use inside a JQL string literal.
fn jql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

struct Session {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
    username: String,
    projects: Vec<String>,
}

impl Session {
    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json")
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }

    fn format_issue(&self, issue: ApiIssue) -> JiraIssue {
        let fields = &issue.fields;
        JiraIssue {
            url: self.browse_url(&issue.key),
            summary: text(fields, "summary"),
            description: present(fields, "description"),
            status: nested_name(fields, "status", "name", "Unknown"),
            priority: nested_name(fields, "priority", "name", "None"),
            assignee: nested_name(fields, "assignee", "displayName", "Unassigned"),
            created: text(fields, "created"),
            updated: text(fields, "updated"),
            due_date: text(fields, "duedate"),
            issue_type: nested_name(fields, "issuetype", "name", "Unknown"),
            labels: fields
                .get("labels")
                .and_then(Value::as_array)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            epic: present(fields, EPIC_LINK_FIELD),
            story_points: present(fields, STORY_POINTS_FIELD),
            sprint: None,
            id: issue.id,
            key: issue.key,
        }
    }

    async fn search(&self, jql: &str, max_results: u32) -> Result<Vec<ApiIssue>, CollectError> {
        let page: SearchPage = http::get_json(
            self.get("/rest/api/2/search")
                .query(&[("jql", jql.to_string()), ("maxResults", max_results.to_string())]),
        )
        .await?;
        Ok(page.issues)
    }

    async fn assigned_issues(&self) -> Result<Vec<JiraIssue>, CollectError> {
        let jql = format!(
            "assignee = {} AND resolution = Unresolved ORDER BY priority DESC, updated DESC",
            jql_quote(&self.username)
        );
        let issues = self.search(&jql, 50).await?;
        Ok(issues.into_iter().map(|i| self.format_issue(i)).collect())
    }

    async fn watching_issues(&self) -> Result<Vec<JiraIssue>, CollectError> {
        let jql = format!(
            "watcher = {} AND resolution = Unresolved ORDER BY updated DESC",
            jql_quote(&self.username)
        );
        let issues = self.search(&jql, 20).await?;
        Ok(issues.into_iter().map(|i| self.format_issue(i)).collect())
    }

    /// Issues in the active sprint of the project's first board.
    async fn sprint_issues(&self, project: &str) -> Result<Vec<JiraIssue>, CollectError> {
        let boards: AgilePage = http::get_json(
            self.get("/rest/agile/1.0/board")
                .query(&[("projectKeyOrId", project)]),
        )
        .await?;
        let Some(board) = boards.values.first() else {
            warn!(connector = NAME, project, "no boards found");
            return Ok(Vec::new());
        };

        let sprints: AgilePage = http::get_json(
            self.get(&format!("/rest/agile/1.0/board/{}/sprint", board.id))
                .query(&[("state", "active")]),
        )
        .await?;
        let Some(sprint) = sprints.values.first() else {
            warn!(connector = NAME, board = board.id, "no active sprint");
            return Ok(Vec::new());
        };

        let page: SearchPage = http::get_json(
            self.get(&format!("/rest/agile/1.0/sprint/{}/issue", sprint.id))
                .query(&[("maxResults", "100")]),
        )
        .await?;

        Ok(page
            .issues
            .into_iter()
            .map(|issue| JiraIssue {
                sprint: Some(sprint.name.clone()),
                ..self.format_issue(issue)
            })
            .collect())
    }

    async fn recent_activity(&self) -> Result<Vec<Activity>, CollectError> {
        let user = jql_quote(&self.username);
        let jql = format!("updatedBy = {user} OR commentedBy = {user} ORDER BY updated DESC");
        let issues = self.search(&jql, 10).await?;
        Ok(issues
            .into_iter()
            .map(|issue| Activity {
                url: self.browse_url(&issue.key),
                summary: text(&issue.fields, "summary"),
                updated: text(&issue.fields, "updated"),
                kind: "issue_update",
                id: issue.id,
                key: issue.key,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct JiraConnector {
    session: Option<Session>,
}

impl JiraConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for JiraConnector {
    async fn init(&mut self, config: &ConnectorConfig) -> Result<(), InitError> {
        let base_url = http::base_url(config.required_str("url")?);
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(InitError::InvalidField {
                field: "url".to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }
        let username = config.required_str("username")?.to_string();
        let api_token = config.required_str("api_token")?;
        let credentials = STANDARD.encode(format!("{username}:{api_token}"));

        self.session = Some(Session {
            client: http::client()?,
            base_url,
            authorization: format!("Basic {credentials}"),
            username,
            projects: config.str_list("projects"),
        });
        info!(connector = NAME, "initialized");
        Ok(())
    }

    async fn collect(&self) -> Result<Value, CollectError> {
        let session = self.session.as_ref().ok_or(CollectError::NotInitialized)?;

        let (assigned, watching, activity) = futures::join!(
            session.assigned_issues(),
            session.watching_issues(),
            session.recent_activity(),
        );
        let mut fragments = Fragments::new(NAME);
        let mut snapshot = JiraSnapshot {
            assigned_issues: fragments.take("assigned_issues", assigned),
            watching_issues: fragments.take("watching_issues", watching),
            sprint_issues: Vec::new(),
            recent_activity: fragments.take("recent_activity", activity),
        };
        for project in &session.projects {
            let issues = session.sprint_issues(project).await;
            snapshot
                .sprint_issues
                .extend(fragments.take("sprint_issues", issues));
        }
        fragments.finish()?;

        serde_json::to_value(snapshot).map_err(|e| CollectError::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jql_quote_escapes_quotes() {
        assert_eq!(jql_quote("dev"), "'dev'");
        assert_eq!(jql_quote("o'brien"), r"'o\'brien'");
    }

    #[tokio::test]
    async fn test_init_requires_all_credentials() {
        let mut connector = JiraConnector::new();
        let config = json!({"url": "https://acme.atlassian.net", "username": "dev"})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(
            connector.init(&config).await,
            Err(InitError::MissingField("api_token".to_string()))
        );
    }

    #[tokio::test]
    async fn test_init_rejects_non_http_url() {
        let mut connector = JiraConnector::new();
        let config = json!({"url": "acme", "username": "dev", "api_token": "t"})
            .as_object()
            .cloned()
            .unwrap();
        assert!(matches!(
            connector.init(&config).await,
            Err(InitError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_format_issue_defaults_missing_fields() {
        let session = Session {
            client: reqwest::Client::new(),
            base_url: "https://acme.atlassian.net".to_string(),
            authorization: String::new(),
            username: "dev".to_string(),
            projects: Vec::new(),
        };
        let issue: ApiIssue = serde_json::from_value(json!({
            "id": "10001",
            "key": "OPS-7",
            "fields": {"summary": "Rotate keys", "assignee": null, "labels": ["security"]}
        }))
        .unwrap();

        let formatted = session.format_issue(issue);
        assert_eq!(formatted.assignee, "Unassigned");
        assert_eq!(formatted.status, "Unknown");
        assert_eq!(formatted.priority, "None");
        assert_eq!(formatted.labels, vec!["security"]);
        assert_eq!(formatted.url, "https://acme.atlassian.net/browse/OPS-7");
        assert!(formatted.epic.is_none());
    }
}
