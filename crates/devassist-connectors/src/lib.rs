//! Built-in DevAssist connectors.
//!
//! Each connector talks to one service over HTTP and degrades per
//! fragment: a failed sub-request logs a warning and contributes an empty
//! list, the rest of the snapshot is still returned.

pub mod github;
pub mod jira;
pub mod slack;

mod http;

use devassist_core::BuiltinCatalog;

pub use github::GitHubConnector;
pub use jira::JiraConnector;
pub use slack::SlackConnector;

/// A catalog holding every built-in connector.
pub fn builtin_catalog() -> BuiltinCatalog {
    let mut catalog = BuiltinCatalog::new();
    catalog
        .register(github::NAME, || Box::new(GitHubConnector::new()))
        .register(jira::NAME, || Box::new(JiraConnector::new()))
        .register(slack::NAME, || Box::new(SlackConnector::new()));
    catalog
}
