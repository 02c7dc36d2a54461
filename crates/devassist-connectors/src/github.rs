//! GitHub: open pull requests (with reviews), open issues and recent
//! notifications for the configured repositories.

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use devassist_core::{CollectError, ConfigExt, Connector, ConnectorConfig, InitError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::http::{self, fragment, Fragments};

pub const NAME: &str = "github";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Notifications older than this are not collected.
const NOTIFICATION_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    html_url: String,
    created_at: String,
    updated_at: String,
    user: ApiUser,
    state: String,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct ApiReview {
    user: Option<ApiUser>,
    state: String,
    submitted_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    html_url: String,
    created_at: String,
    updated_at: String,
    user: ApiUser,
    state: String,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    pull_request: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiSubject {
    title: String,
    url: Option<String>,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiNotification {
    id: String,
    repository: ApiRepository,
    subject: ApiSubject,
    reason: String,
    updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct Review {
    pub user: Option<String>,
    pub state: String,
    pub submitted_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PullRequest {
    pub repo: String,
    pub id: u64,
    pub title: String,
    pub url: String,
    pub created_at: String,
    pub updated_at: String,
    pub user: String,
    pub state: String,
    pub reviews: Vec<Review>,
    pub is_draft: bool,
}

#[derive(Debug, Serialize)]
pub struct Issue {
    pub repo: String,
    pub id: u64,
    pub title: String,
    pub url: String,
    pub created_at: String,
    pub updated_at: String,
    pub user: String,
    pub state: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Notification {
    pub id: String,
    pub repo: String,
    pub subject: String,
    pub reason: String,
    pub updated_at: String,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Default, Serialize)]
pub struct GitHubSnapshot {
    pub pull_requests: Vec<PullRequest>,
    pub issues: Vec<Issue>,
    pub notifications: Vec<Notification>,
}

struct Session {
    client: reqwest::Client,
    api_url: String,
    token: String,
    repositories: Vec<(String, String)>,
}

impl Session {
    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_url, path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn pull_requests(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<PullRequest>, CollectError> {
        let pulls: Vec<ApiPull> = http::get_json(
            self.get(&format!("/repos/{owner}/{repo}/pulls"))
                .query(&[("state", "open")]),
        )
        .await?;

        let reviews = join_all(pulls.iter().map(|pr| self.reviews(owner, repo, pr.number))).await;
        let full_name = format!("{owner}/{repo}");

        Ok(pulls
            .into_iter()
            .zip(reviews)
            .map(|(pr, reviews)| PullRequest {
                repo: full_name.clone(),
                id: pr.number,
                title: pr.title,
                url: pr.html_url,
                created_at: pr.created_at,
                updated_at: pr.updated_at,
                user: pr.user.login,
                state: pr.state,
                reviews: fragment(NAME, "reviews", reviews),
                is_draft: pr.draft,
            })
            .collect())
    }

    async fn reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Review>, CollectError> {
        let reviews: Vec<ApiReview> =
            http::get_json(self.get(&format!("/repos/{owner}/{repo}/pulls/{number}/reviews")))
                .await?;
        Ok(reviews
            .into_iter()
            .map(|r| Review {
                user: r.user.map(|u| u.login),
                state: r.state,
                submitted_at: r.submitted_at,
            })
            .collect())
    }

    async fn issues(&self, owner: &str, repo: &str) -> Result<Vec<Issue>, CollectError> {
        let issues: Vec<ApiIssue> = http::get_json(
            self.get(&format!("/repos/{owner}/{repo}/issues"))
                .query(&[("state", "open")]),
        )
        .await?;

        // The issues endpoint also lists pull requests.
        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(|issue| Issue {
                repo: format!("{owner}/{repo}"),
                id: issue.number,
                title: issue.title,
                url: issue.html_url,
                created_at: issue.created_at,
                updated_at: issue.updated_at,
                user: issue.user.login,
                state: issue.state,
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect())
    }

    async fn notifications(&self) -> Result<Vec<Notification>, CollectError> {
        let since = (Utc::now() - Duration::days(NOTIFICATION_WINDOW_DAYS))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let notifications: Vec<ApiNotification> = http::get_json(
            self.get("/notifications")
                .query(&[("all", "false"), ("since", since.as_str())]),
        )
        .await?;

        Ok(notifications
            .into_iter()
            .map(|n| Notification {
                id: n.id,
                repo: n.repository.full_name,
                subject: n.subject.title,
                reason: n.reason,
                updated_at: n.updated_at,
                url: n.subject.url,
                kind: n.subject.kind,
            })
            .collect())
    }
}

/// Parse `owner/repo`, rejecting anything else.
fn split_repository(full_name: &str) -> Option<(String, String)> {
    let (owner, repo) = full_name.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

#[derive(Default)]
pub struct GitHubConnector {
    session: Option<Session>,
}

impl GitHubConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for GitHubConnector {
    async fn init(&mut self, config: &ConnectorConfig) -> Result<(), InitError> {
        let token = config.required_str("token")?.to_string();
        let api_url = http::base_url(config.str_field("api_url").unwrap_or(DEFAULT_API_URL));

        let mut repositories = Vec::new();
        for full_name in config.str_list("repositories") {
            match split_repository(&full_name) {
                Some(pair) => repositories.push(pair),
                None => warn!(
                    connector = NAME,
                    repository = %full_name,
                    "ignoring malformed repository, expected owner/repo"
                ),
            }
        }
        if repositories.is_empty() {
            warn!(connector = NAME, "no repositories configured");
        }

        self.session = Some(Session {
            client: http::client()?,
            api_url,
            token,
            repositories,
        });
        info!(connector = NAME, "initialized");
        Ok(())
    }

    async fn collect(&self) -> Result<Value, CollectError> {
        let session = self.session.as_ref().ok_or(CollectError::NotInitialized)?;
        let mut snapshot = GitHubSnapshot::default();
        let mut fragments = Fragments::new(NAME);

        for (owner, repo) in &session.repositories {
            let (pulls, issues) = futures::join!(
                session.pull_requests(owner, repo),
                session.issues(owner, repo)
            );
            snapshot
                .pull_requests
                .extend(fragments.take("pull_requests", pulls));
            snapshot.issues.extend(fragments.take("issues", issues));
        }
        snapshot.notifications = fragments.take("notifications", session.notifications().await);
        fragments.finish()?;

        serde_json::to_value(snapshot).map_err(|e| CollectError::Protocol(e.to_string()))
    }
}
