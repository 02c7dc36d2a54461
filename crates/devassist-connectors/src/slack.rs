//! Slack: mentions, direct messages, unread channels and messages that
//! look important, from the last day of history.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devassist_core::{CollectError, ConfigExt, Connector, ConnectorConfig, InitError};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::http::{self, fragment};

pub const NAME: &str = "slack";
pub const DEFAULT_API_URL: &str = "https://slack.com/api";

const HISTORY_WINDOW_SECS: i64 = 24 * 60 * 60;
const IGNORED_SUBTYPES: &[&str] = &["bot_message", "channel_join", "channel_leave"];
const URGENT_KEYWORDS: &[&str] = &[
    "urgent", "asap", "important", "critical", "deadline", "help", "broken", "failed", "error",
];

#[derive(Debug, Deserialize)]
struct AuthTest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ConversationList {
    #[serde(default)]
    channels: Vec<ApiConversation>,
}

#[derive(Debug, Deserialize)]
struct ApiConversation {
    id: String,
    name: Option<String>,
    #[serde(default)]
    is_im: bool,
    #[serde(default)]
    is_mpim: bool,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    unread_count: u64,
}

impl ApiConversation {
    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "DM".to_string())
    }

    fn kind(&self) -> &'static str {
        if self.is_im {
            "direct_message"
        } else if self.is_mpim {
            "group_message"
        } else if self.is_private {
            "private_channel"
        } else {
            "public_channel"
        }
    }
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiReaction {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    ts: String,
    subtype: Option<String>,
    user: Option<String>,
    #[serde(default)]
    text: String,
    thread_ts: Option<String>,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    attachments: Vec<Value>,
    #[serde(default)]
    reactions: Vec<ApiReaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user: Option<String>,
    pub text: String,
    pub timestamp: String,
    pub time: Option<String>,
    pub has_attachments: bool,
    pub reaction_count: u64,
    pub url: String,
    pub is_thread: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadChannel {
    pub id: String,
    pub name: String,
    pub unread_count: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SlackSnapshot {
    pub mentions: Vec<Message>,
    pub direct_messages: Vec<Message>,
    pub unread_channels: Vec<UnreadChannel>,
    pub important_messages: Vec<Message>,
}

/// Slack `ts` values are `<seconds>.<micros>`.
fn ts_to_rfc3339(ts: &str) -> Option<String> {
    let (secs, micros) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{micros:0<6}").get(..6)?.parse().ok()?;
    DateTime::<Utc>::from_timestamp(secs, micros * 1_000).map(|t| t.to_rfc3339())
}

struct Session {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channels: HashSet<String>,
    managers: HashSet<String>,
    team_id: Option<String>,
}

impl Session {
    /// Call a Web API method; `ok: false` is a remote error.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, CollectError> {
        let body: Value = http::get_json(
            self.client
                .get(format!("{}/{method}", self.api_url))
                .bearer_auth(&self.token)
                .query(query),
        )
        .await?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(CollectError::Remote(format!("{method}: {error}")));
        }
        serde_json::from_value(body).map_err(|e| CollectError::Protocol(format!("{method}: {e}")))
    }

    fn redirect_url(&self, channel_id: &str, message_ts: Option<&str>) -> String {
        let mut url = format!("https://slack.com/app_redirect?channel={channel_id}");
        if let Some(ts) = message_ts {
            url.push_str(&format!("&message_ts={ts}"));
        }
        if let Some(team) = &self.team_id {
            url.push_str(&format!("&team={team}"));
        }
        url
    }

    fn is_important(&self, message: &ApiMessage) -> bool {
        if !message.reactions.is_empty() {
            return true;
        }
        let text = message.text.to_lowercase();
        if URGENT_KEYWORDS.iter().any(|k| text.contains(k)) {
            return true;
        }
        if message.thread_ts.is_some() && message.reply_count > 0 {
            return true;
        }
        message
            .user
            .as_ref()
            .is_some_and(|u| self.managers.contains(u))
    }

    fn format_message(&self, message: &ApiMessage, conversation: &ApiConversation) -> Message {
        Message {
            id: message.ts.clone(),
            channel_id: conversation.id.clone(),
            channel_name: conversation.display_name(),
            user: message.user.clone(),
            text: message.text.clone(),
            timestamp: message.ts.clone(),
            time: ts_to_rfc3339(&message.ts),
            has_attachments: !message.attachments.is_empty(),
            reaction_count: message.reactions.iter().map(|r| r.count).sum(),
            url: self.redirect_url(&conversation.id, Some(&message.ts)),
            is_thread: message.thread_ts.is_some(),
            thread_id: message.thread_ts.clone(),
            reply_count: message.thread_ts.as_ref().map(|_| message.reply_count),
            thread_url: message
                .thread_ts
                .as_deref()
                .map(|ts| self.redirect_url(&conversation.id, Some(ts))),
        }
    }

    async fn history(&self, channel_id: &str) -> Result<Vec<ApiMessage>, CollectError> {
        let oldest = Utc::now().timestamp() - HISTORY_WINDOW_SECS;
        let history: History = self
            .call(
                "conversations.history",
                &[
                    ("channel", channel_id.to_string()),
                    ("limit", "50".to_string()),
                    ("oldest", oldest.to_string()),
                ],
            )
            .await?;
        Ok(history.messages)
    }

    fn watched(&self, conversation: &ApiConversation) -> bool {
        conversation.is_im
            || self.channels.is_empty()
            || conversation
                .name
                .as_ref()
                .is_some_and(|n| self.channels.contains(n))
    }
}

#[derive(Default)]
pub struct SlackConnector {
    session: Option<Session>,
}

impl SlackConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for SlackConnector {
    async fn init(&mut self, config: &ConnectorConfig) -> Result<(), InitError> {
        let token = config.required_str("token")?.to_string();
        self.session = Some(Session {
            client: http::client()?,
            api_url: http::base_url(config.str_field("api_url").unwrap_or(DEFAULT_API_URL)),
            token,
            channels: config.str_list("channels").into_iter().collect(),
            managers: config.str_list("managers").into_iter().collect(),
            team_id: config.str_field("team_id").map(str::to_string),
        });
        info!(connector = NAME, "initialized");
        Ok(())
    }

    async fn collect(&self) -> Result<Value, CollectError> {
        let session = self.session.as_ref().ok_or(CollectError::NotInitialized)?;

        // Without the caller's id nothing can be attributed to them.
        let auth: AuthTest = session.call("auth.test", &[]).await?;
        let mention = format!("<@{}>", auth.user_id);

        let conversations = fragment(
            NAME,
            "conversations",
            session
                .call::<ConversationList>(
                    "conversations.list",
                    &[
                        ("types", "public_channel,private_channel,mpim,im".to_string()),
                        ("exclude_archived", "true".to_string()),
                        ("limit", "100".to_string()),
                    ],
                )
                .await
                .map(|list| list.channels),
        );
        if conversations.is_empty() {
            warn!(connector = NAME, "no conversations found");
        }

        let watched: Vec<&ApiConversation> =
            conversations.iter().filter(|c| session.watched(c)).collect();
        let histories = join_all(watched.iter().map(|c| session.history(&c.id))).await;

        let mut snapshot = SlackSnapshot::default();
        for (conversation, history) in watched.into_iter().zip(histories) {
            if conversation.unread_count > 0 {
                snapshot.unread_channels.push(UnreadChannel {
                    id: conversation.id.clone(),
                    name: conversation.display_name(),
                    unread_count: conversation.unread_count,
                    kind: conversation.kind(),
                    url: session.redirect_url(&conversation.id, None),
                });
            }

            for message in fragment(NAME, "history", history) {
                if message
                    .subtype
                    .as_deref()
                    .is_some_and(|s| IGNORED_SUBTYPES.contains(&s))
                {
                    continue;
                }
                let formatted = session.format_message(&message, conversation);
                if message.text.contains(&mention) {
                    snapshot.mentions.push(formatted.clone());
                }
                if conversation.is_im {
                    snapshot.direct_messages.push(formatted.clone());
                }
                if session.is_important(&message) {
                    snapshot.important_messages.push(formatted);
                }
            }
        }

        serde_json::to_value(snapshot).map_err(|e| CollectError::Protocol(e.to_string()))
    }
}
