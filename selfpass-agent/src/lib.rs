//! Device agent for a self-hosted, end-to-end encrypted credential store.
//!
//! The agent pairs a device with a server, authenticates every request with a
//! fresh forward-secret handshake, and keeps an encrypted keystore in sync
//! across devices. The server only ever sees ciphertext.

pub mod agent;
pub mod config;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod identity;
pub mod keystore;
pub mod pairing;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod sync;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use agent::{Agent, AgentRequest, AgentResponse, AgentStatus, LoginState};
pub use config::{load_config, save_config, AgentConfig, RetryPolicy};
pub use error::{Result, SelfpassError};
pub use keystore::{CredentialEntry, Keystore};
pub use sync::{KeystoreTag, PullOutcome};

/// Install the global tracing subscriber. `RUST_LOG` overrides
/// `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
