use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::SystemCrypto;
use crate::error::{Result, SelfpassError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Directory for the file-backed store.
    pub data_dir: PathBuf,
    pub request_timeout_secs: u64,
    /// PBKDF2 iterations for the access key and the master key. Must match the server.
    pub kdf_iterations: u32,
    /// Length of the identifier prefix of a combined access key.
    pub access_key_id_len: usize,
    /// Retries after an OUTDATED push before giving up.
    pub max_sync_retries: u32,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
    /// Pull from the server in the background after a returning login.
    pub pull_on_login: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            request_timeout_secs: 30,
            kdf_iterations: crate::crypto::DEFAULT_KDF_ITERATIONS,
            access_key_id_len: 2,
            max_sync_retries: 5,
            retry_backoff_ms: 200,
            retry_backoff_max_ms: 5_000,
            pull_on_login: true,
        }
    }
}

/// Platform data directory (e.g. `~/.local/share/selfpass` on Linux).
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("selfpass")
}

/// Bounded exponential backoff for OUTDATED retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl AgentConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_sync_retries,
            base_delay: Duration::from_millis(self.retry_backoff_ms),
            max_delay: Duration::from_millis(self.retry_backoff_max_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn crypto(&self) -> SystemCrypto {
        SystemCrypto::with_kdf_iterations(self.kdf_iterations)
    }

    fn validate(&self) -> Result<()> {
        if self.kdf_iterations == 0 {
            return Err(SelfpassError::Config("kdf_iterations must be non-zero".into()));
        }
        if self.access_key_id_len == 0 {
            return Err(SelfpassError::Config("access_key_id_len must be non-zero".into()));
        }
        Ok(())
    }
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        return Ok(AgentConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: AgentConfig = serde_json::from_str(&content)
        .map_err(|e| SelfpassError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &AgentConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
