use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One recorded password state for a username at a host. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub host: String,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Whole seconds since the Unix epoch.
    pub time: i64,
}

impl CredentialEntry {
    /// Total order used by merge: time first, then password, then url.
    pub(crate) fn merge_order(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.password.cmp(&other.password))
            .then_with(|| self.url.cmp(&other.url))
    }
}

/// Entries for one `(host, username)`, ascending by time. The last is current.
pub type CredentialHistory = Vec<CredentialEntry>;

/// Histories for every username at one host.
pub type HostCredentials = std::collections::BTreeMap<String, CredentialHistory>;

/// Key a URL is filed under: its host (with a non-default port), or the raw
/// string when it parses but has no host. `None` when it does not parse.
pub(crate) fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = match parsed.host_str() {
        Some(host) => match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        },
        None => url.to_string(),
    };
    Some(host)
}
