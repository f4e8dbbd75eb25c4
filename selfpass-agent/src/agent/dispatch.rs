use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Agent, AgentStatus};
use crate::error::Result;
use crate::generator::{generate_password, PasswordOptions};
use crate::keystore::{CredentialEntry, HostSummary, Keystore};
use crate::sync::{KeystoreTag, PullOutcome};

/// Every message a front end may send to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum AgentRequest {
    GetCredentials {
        url: String,
    },
    GetKeystore,
    Search {
        query: String,
    },
    LoginStatus,
    Login {
        password: String,
    },
    Logout,
    SaveCredentials {
        url: String,
        username: String,
        password: String,
        #[serde(default)]
        favicon: Option<String>,
    },
    Pair {
        server_address: String,
        username: String,
        access_key: String,
        master_password: String,
    },
    Unpair,
    Sync,
    GeneratePassword {
        #[serde(default)]
        options: PasswordOptions,
    },
}

impl AgentRequest {
    fn name(&self) -> &'static str {
        match self {
            Self::GetCredentials { .. } => "get-credentials",
            Self::GetKeystore => "get-keystore",
            Self::Search { .. } => "search",
            Self::LoginStatus => "login-status",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::SaveCredentials { .. } => "save-credentials",
            Self::Pair { .. } => "pair",
            Self::Unpair => "unpair",
            Self::Sync => "sync",
            Self::GeneratePassword { .. } => "generate-password",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "kebab-case")]
pub enum AgentResponse {
    Done,
    Credentials {
        credentials: Option<BTreeMap<String, CredentialEntry>>,
    },
    Keystore {
        keystore: Keystore,
    },
    Hosts {
        hosts: Vec<HostSummary>,
    },
    Status {
        status: AgentStatus,
    },
    Saved {
        tag: KeystoreTag,
    },
    Synced {
        updated: bool,
    },
    Password {
        password: String,
    },
}

impl Agent {
    /// Handle one front-end request.
    pub async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse> {
        debug!("Dispatching {}", request.name());

        let response = match request {
            AgentRequest::GetCredentials { url } => AgentResponse::Credentials {
                credentials: self.credentials_for_url(&url).await?,
            },
            AgentRequest::GetKeystore => AgentResponse::Keystore {
                keystore: self.keystore_snapshot().await?,
            },
            AgentRequest::Search { query } => AgentResponse::Hosts {
                hosts: self.search(&query).await?,
            },
            AgentRequest::LoginStatus => AgentResponse::Status {
                status: self.status().await,
            },
            AgentRequest::Login { password } => {
                self.login(&password).await?;
                AgentResponse::Done
            }
            AgentRequest::Logout => {
                self.logout().await;
                AgentResponse::Done
            }
            AgentRequest::SaveCredentials {
                url,
                username,
                password,
                favicon,
            } => AgentResponse::Saved {
                tag: self.save_credentials(&url, &username, &password, favicon).await?,
            },
            AgentRequest::Pair {
                server_address,
                username,
                access_key,
                master_password,
            } => {
                self.pair_device(&server_address, &username, &access_key, &master_password)
                    .await?;
                AgentResponse::Done
            }
            AgentRequest::Unpair => {
                self.unpair().await?;
                AgentResponse::Done
            }
            AgentRequest::Sync => AgentResponse::Synced {
                updated: matches!(self.sync_now().await?, PullOutcome::Merged(_)),
            },
            AgentRequest::GeneratePassword { options } => AgentResponse::Password {
                password: generate_password(&options)?,
            },
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::agent::LoginState;
    use crate::error::SelfpassError;
    use crate::storage::MemoryStore;
    use crate::testing::{test_agent, FakeServer, MASTER_PASSWORD, SERVER_ADDRESS};

    #[test]
    fn test_request_wire_shape() {
        let request: AgentRequest = serde_json::from_value(json!({
            "request": "save-credentials",
            "url": "https://a.com",
            "username": "u",
            "password": "p"
        }))
        .unwrap();
        assert_eq!(
            request,
            AgentRequest::SaveCredentials {
                url: "https://a.com".into(),
                username: "u".into(),
                password: "p".into(),
                favicon: None,
            }
        );

        let unknown = serde_json::from_value::<AgentRequest>(json!({"request": "fill-form"}));
        assert!(unknown.is_err());
    }

    #[tokio::test]
    async fn test_full_flow_through_dispatch() {
        let server = FakeServer::new();
        let agent = test_agent(&server, Arc::new(MemoryStore::new()));

        let status = agent.dispatch(AgentRequest::LoginStatus).await.unwrap();
        assert!(matches!(
            status,
            AgentResponse::Status { status } if status.state == LoginState::Unpaired
        ));

        agent
            .dispatch(AgentRequest::Pair {
                server_address: SERVER_ADDRESS.into(),
                username: "alice".into(),
                access_key: server.issue_access_key(),
                master_password: MASTER_PASSWORD.into(),
            })
            .await
            .unwrap();

        let saved = agent
            .dispatch(AgentRequest::SaveCredentials {
                url: "http://example.com".into(),
                username: "alice".into(),
                password: "pw1".into(),
                favicon: None,
            })
            .await
            .unwrap();
        assert!(matches!(saved, AgentResponse::Saved { .. }));

        let found = agent
            .dispatch(AgentRequest::GetCredentials {
                url: "http://example.com".into(),
            })
            .await
            .unwrap();
        match found {
            AgentResponse::Credentials {
                credentials: Some(credentials),
            } => assert_eq!(credentials["alice"].password, "pw1"),
            other => panic!("unexpected response: {:?}", other),
        }

        let synced = agent.dispatch(AgentRequest::Sync).await.unwrap();
        assert_eq!(synced, AgentResponse::Synced { updated: false });

        agent.dispatch(AgentRequest::Logout).await.unwrap();
        let err = agent
            .dispatch(AgentRequest::Login {
                password: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SelfpassError::WrongCredential));
        assert!(err.is_user_facing());
    }

    #[tokio::test]
    async fn test_generate_password_needs_no_login() {
        let server = FakeServer::new();
        let agent = test_agent(&server, Arc::new(MemoryStore::new()));

        let response = agent
            .dispatch(AgentRequest::GeneratePassword {
                options: PasswordOptions {
                    length: 20,
                    ..PasswordOptions::default()
                },
            })
            .await
            .unwrap();
        match response {
            AgentResponse::Password { password } => assert_eq!(password.len(), 20),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_precondition_errors_surface() {
        let server = FakeServer::new();
        let agent = test_agent(&server, Arc::new(MemoryStore::new()));

        let err = agent.dispatch(AgentRequest::GetKeystore).await.unwrap_err();
        assert!(matches!(err, SelfpassError::NotPaired));
        assert_eq!(err.code(), "NOT_PAIRED");
    }
}
