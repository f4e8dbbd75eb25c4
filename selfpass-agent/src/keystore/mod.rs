//! The credential data model.
//!
//! A `Keystore` maps host to username to a time-ordered history of
//! `CredentialEntry`. Inserts always append; adjacent entries with the same
//! password are collapsed only when histories are merged.

mod entry;
mod iter;
mod merge;

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use entry::{CredentialEntry, CredentialHistory, HostCredentials};
pub use iter::{Credentials, CurrentCredentials};

use crate::error::{Result, SelfpassError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keystore {
    #[serde(default)]
    hosts: BTreeMap<String, HostCredentials>,
    #[serde(default)]
    favicons: BTreeMap<String, Option<String>>,
}

/// A host matching a `Keystore::search` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSummary {
    pub host: String,
    pub usernames: Vec<String>,
    pub favicon: Option<String>,
}

impl Keystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a credential stamped with the current time.
    pub fn add_credentials(
        &mut self,
        url: &str,
        username: &str,
        password: &str,
        favicon: Option<String>,
    ) {
        self.add_credentials_at(url, username, password, favicon, Utc::now().timestamp());
    }

    pub fn add_credentials_at(
        &mut self,
        url: &str,
        username: &str,
        password: &str,
        favicon: Option<String>,
        time: i64,
    ) {
        let host = entry::host_of(url).unwrap_or_else(|| url.to_string());

        self.hosts
            .entry(host.clone())
            .or_default()
            .entry(username.to_string())
            .or_default()
            .push(CredentialEntry {
                host: host.clone(),
                url: url.to_string(),
                username: username.to_string(),
                password: password.to_string(),
                time,
            });

        let slot = self.favicons.entry(host.clone()).or_insert(None);
        if slot.is_none() {
            *slot = favicon;
        }

        debug!("Added credentials for {} at {}", username, host);
    }

    /// Every history for the URL's host, or `None` when the host is unknown
    /// or the URL does not parse.
    pub fn credentials_matching(&self, url: &str) -> Option<&HostCredentials> {
        let host = entry::host_of(url)?;
        self.hosts.get(&host)
    }

    /// The latest entry per username for the URL's host.
    pub fn current_credentials_matching(
        &self,
        url: &str,
    ) -> Option<BTreeMap<&str, &CredentialEntry>> {
        self.credentials_matching(url).map(iter::latest_per_user)
    }

    pub fn credentials(&self) -> Credentials<'_> {
        Credentials::new(&self.hosts)
    }

    pub fn current_credentials(&self) -> CurrentCredentials<'_> {
        CurrentCredentials::new(&self.hosts)
    }

    pub fn favicon(&self, host: &str) -> Option<&str> {
        self.favicons.get(host).and_then(|f| f.as_deref())
    }

    /// Hosts whose name contains `fragment`, ignoring case.
    pub fn search(&self, fragment: &str) -> Vec<HostSummary> {
        let needle = fragment.to_lowercase();
        self.hosts
            .iter()
            .filter(|(host, _)| host.to_lowercase().contains(&needle))
            .map(|(host, data)| HostSummary {
                host: host.clone(),
                usernames: data.keys().cloned().collect(),
                favicon: self.favicon(host).map(str::to_string),
            })
            .collect()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Total number of entries across all histories.
    pub fn entry_count(&self) -> usize {
        self.hosts
            .values()
            .flat_map(|data| data.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Merge `other` into this keystore in place.
    pub fn merge(&mut self, other: &Keystore) {
        for (host, their_data) in &other.hosts {
            let our_data = self.hosts.entry(host.clone()).or_default();
            for (username, theirs) in their_data {
                match our_data.get_mut(username) {
                    Some(ours) => *ours = merge::merge_histories(ours, theirs),
                    None => {
                        our_data.insert(username.clone(), theirs.clone());
                    }
                }
            }
        }

        for (host, favicon) in &other.favicons {
            match favicon {
                Some(_) => {
                    self.favicons.insert(host.clone(), favicon.clone());
                }
                None => {
                    self.favicons.entry(host.clone()).or_insert(None);
                }
            }
        }
    }

    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a serialized keystore, rejecting empty or unsorted histories.
    pub fn from_serialized(serialized: &str) -> Result<Self> {
        let keystore: Keystore = serde_json::from_str(serialized)?;
        keystore.validate()?;
        Ok(keystore)
    }

    fn validate(&self) -> Result<()> {
        for (host, data) in &self.hosts {
            for (username, history) in data {
                if history.is_empty() {
                    return Err(SelfpassError::Protocol(format!(
                        "empty history for {} at {}",
                        username, host
                    )));
                }
                if history.windows(2).any(|w| w[0].time > w[1].time) {
                    return Err(SelfpassError::Protocol(format!(
                        "history for {} at {} is not time-sorted",
                        username, host
                    )));
                }
            }
        }
        Ok(())
    }
}
