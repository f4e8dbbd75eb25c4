//! The device agent.
//!
//! `Agent` owns everything the device knows: its identity, the unlocked vault
//! and the collaborators used to reach the server. It is a cheap handle; clones
//! share state, which lets background pulls run against the same vault as
//! foreground edits.

mod dispatch;
mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use dispatch::{AgentRequest, AgentResponse};
pub use state::{AgentStatus, LoginState};

use crate::config::AgentConfig;
use crate::crypto::{CryptoProvider, SymmetricKey};
use crate::error::{Result, SelfpassError};
use crate::identity::{DeviceIdentity, UserId};
use crate::keystore::{CredentialEntry, HostSummary, Keystore};
use crate::pairing::{AccessKey, PairingProtocol};
use crate::storage::{
    delete_pairing_record, delete_user_cache, load_cached_keystore, load_keystore_tag,
    load_pairing_record, save_pairing_record, FileStore, KeyValueStore, PairingRecord,
};
use crate::sync::{KeystoreTag, PullOutcome, SharedVault, SyncEngine, UnlockedVault};
use crate::transport::{HttpTransport, Transport};

#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    config: AgentConfig,
    crypto: Arc<dyn CryptoProvider>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    sync: SyncEngine,
    identity: RwLock<Option<DeviceIdentity>>,
    vault: RwLock<Option<SharedVault>>,
}

impl Agent {
    /// Production agent: file store under `config.data_dir`, HTTPS transport.
    pub fn open(config: AgentConfig) -> Result<Self> {
        let store = FileStore::open(&config.data_dir)?;
        let transport = HttpTransport::new(config.request_timeout())?;
        let crypto = config.crypto();
        Self::with_parts(config, Arc::new(crypto), Arc::new(transport), Arc::new(store))
    }

    /// Build an agent from explicit collaborators and rehydrate the identity
    /// from the stored pairing record.
    pub fn with_parts(
        config: AgentConfig,
        crypto: Arc<dyn CryptoProvider>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let identity = load_pairing_record(store.as_ref())?.and_then(|r| r.active_identity());
        match &identity {
            Some(identity) => info!("Loaded pairing for {} (device {})", identity.username, identity.device_id),
            None => debug!("No pairing record"),
        }

        let sync = SyncEngine::new(
            crypto.clone(),
            transport.clone(),
            store.clone(),
            config.retry_policy(),
        );

        Ok(Self {
            inner: Arc::new(AgentInner {
                config,
                crypto,
                transport,
                store,
                sync,
                identity: RwLock::new(identity),
                vault: RwLock::new(None),
            }),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    async fn identity(&self) -> Result<DeviceIdentity> {
        self.inner
            .identity
            .read()
            .await
            .clone()
            .ok_or(SelfpassError::NotPaired)
    }

    async fn vault(&self) -> Result<SharedVault> {
        self.identity().await?;
        self.inner
            .vault
            .read()
            .await
            .clone()
            .ok_or(SelfpassError::NotLoggedIn)
    }

    fn derive_master_key(&self, identity: &DeviceIdentity, password: &str) -> Result<SymmetricKey> {
        if password.is_empty() {
            return Err(SelfpassError::InvalidInput("master password is empty".into()));
        }
        Ok(self.inner.crypto.pbkdf(password, identity.user_id.as_str())?)
    }

    // =========================================================================
    // Pairing
    // =========================================================================

    /// Register this device, persist the pairing, then log in with
    /// `master_password`. If any step fails the stored pairing and cache are
    /// restored to what they were before the call.
    pub async fn pair_device(
        &self,
        server_address: &str,
        username: &str,
        access_key: &str,
        master_password: &str,
    ) -> Result<()> {
        if let Some(identity) = self.inner.identity.read().await.as_ref() {
            return Err(SelfpassError::AlreadyPaired(identity.username.clone()));
        }

        let access_key = AccessKey::parse(access_key, self.inner.config.access_key_id_len)?;
        let identity = PairingProtocol::new(self.inner.crypto.as_ref(), self.inner.transport.as_ref())
            .register(server_address, username, &access_key)
            .await?;

        let store = self.inner.store.as_ref();
        let previous = load_pairing_record(store)?;
        let had_cache = load_cached_keystore(store, &identity.user_id)?.is_some();
        let mut record = previous.clone().unwrap_or_default();
        record.insert_identity(&identity);
        save_pairing_record(store, &record)?;

        let user_id = identity.user_id.clone();
        *self.inner.identity.write().await = Some(identity);
        if let Err(e) = self.login(master_password).await {
            warn!("Pairing rolled back: {}", e);
            self.rollback_pairing(previous, &user_id, had_cache).await?;
            return Err(e);
        }
        Ok(())
    }

    async fn rollback_pairing(
        &self,
        previous: Option<PairingRecord>,
        user_id: &UserId,
        had_cache: bool,
    ) -> Result<()> {
        *self.inner.vault.write().await = None;
        *self.inner.identity.write().await = None;

        let store = self.inner.store.as_ref();
        match previous {
            Some(record) => save_pairing_record(store, &record)?,
            None => delete_pairing_record(store)?,
        }
        if !had_cache {
            delete_user_cache(store, user_id)?;
        }
        Ok(())
    }

    /// Log out, then forget this user's pairing and cached keystore.
    pub async fn unpair(&self) -> Result<()> {
        let identity = self.identity().await?;
        self.logout().await;

        let store = self.inner.store.as_ref();
        if let Some(mut record) = load_pairing_record(store)? {
            if record.remove_user(&identity.user_id) {
                delete_pairing_record(store)?;
            } else {
                save_pairing_record(store, &record)?;
            }
        }
        delete_user_cache(store, &identity.user_id)?;

        *self.inner.identity.write().await = None;
        info!("Unpaired device {}", identity.device_id);
        Ok(())
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Open the cached keystore with `password`, or start a fresh one when
    /// nothing is cached yet.
    pub async fn login(&self, password: &str) -> Result<()> {
        let identity = self.identity().await?;
        let store = self.inner.store.as_ref();

        let Some(sealed) = load_cached_keystore(store, &identity.user_id)? else {
            return self.login_first_time(password).await;
        };

        let master_key = self.derive_master_key(&identity, password)?;
        let plaintext = self
            .inner
            .crypto
            .aead_decrypt(&master_key, &sealed)
            .map_err(|_| {
                warn!("Master password rejected for {}", identity.username);
                SelfpassError::WrongCredential
            })?;
        let serialized = String::from_utf8(plaintext)
            .map_err(|_| SelfpassError::Storage("cached keystore is not UTF-8".into()))?;
        let keystore = Keystore::from_serialized(&serialized)?;
        let tag = load_keystore_tag(store, &identity.user_id)?;

        let entries = keystore.entry_count();
        *self.inner.vault.write().await =
            Some(UnlockedVault::new(master_key, keystore, tag).into_shared());
        info!("Logged in as {} ({} entries)", identity.username, entries);

        if self.inner.config.pull_on_login {
            self.spawn_background_pull();
        }
        Ok(())
    }

    /// Start an empty keystore under a key derived from `password`, cache it,
    /// and seed the server with it. Only reached when nothing is cached.
    ///
    /// An unreachable server does not fail the login; the next push seeds it.
    async fn login_first_time(&self, password: &str) -> Result<()> {
        let identity = self.identity().await?;
        if load_cached_keystore(self.inner.store.as_ref(), &identity.user_id)?.is_some() {
            return Err(SelfpassError::Storage(
                "a keystore is already cached for this user".into(),
            ));
        }
        let master_key = self.derive_master_key(&identity, password)?;

        let vault = UnlockedVault::new(master_key, Keystore::new(), None);
        self.inner.sync.persist(&identity.user_id, &vault)?;
        let vault = vault.into_shared();
        *self.inner.vault.write().await = Some(vault.clone());
        info!("Created keystore for {}", identity.username);

        match self.inner.sync.push(&identity, &vault).await {
            Ok(tag) => {
                debug!("Seeded server keystore at {}", tag);
                Ok(())
            }
            Err(SelfpassError::Transport(e)) => {
                warn!("Could not seed server keystore: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the master key and live keystore. The cache on disk stays.
    pub async fn logout(&self) {
        if self.inner.vault.write().await.take().is_some() {
            info!("Logged out");
        }
    }

    fn spawn_background_pull(&self) {
        let agent = self.clone();
        tokio::spawn(async move {
            match agent.sync_now().await {
                Ok(outcome) => debug!("Background pull finished: {:?}", outcome),
                Err(e) => warn!("Background pull failed: {}", e),
            }
        });
    }

    pub async fn is_paired(&self) -> bool {
        self.inner.identity.read().await.is_some()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.is_paired().await && self.inner.vault.read().await.is_some()
    }

    pub async fn login_state(&self) -> LoginState {
        if !self.is_paired().await {
            LoginState::Unpaired
        } else if self.inner.vault.read().await.is_some() {
            LoginState::LoggedIn
        } else {
            LoginState::LoggedOut
        }
    }

    pub async fn status(&self) -> AgentStatus {
        let identity = self.inner.identity.read().await.clone();
        let entries = match self.inner.vault.read().await.as_ref() {
            Some(vault) => Some(vault.read().await.keystore.entry_count()),
            None => None,
        };
        AgentStatus {
            state: self.login_state().await,
            username: identity.as_ref().map(|i| i.username.clone()),
            device_id: identity.as_ref().map(|i| i.device_id.to_string()),
            server_address: identity.as_ref().map(|i| i.server_address.clone()),
            entries,
        }
    }

    // =========================================================================
    // Keystore
    // =========================================================================

    /// Add a credential, cache the keystore, and push it. The local copy is
    /// kept even when the push fails.
    pub async fn save_credentials(
        &self,
        url: &str,
        username: &str,
        password: &str,
        favicon: Option<String>,
    ) -> Result<KeystoreTag> {
        let identity = self.identity().await?;
        let vault = self.vault().await?;
        {
            let mut vault = vault.write().await;
            vault.keystore.add_credentials(url, username, password, favicon);
            self.inner.sync.persist(&identity.user_id, &vault)?;
        }
        self.inner.sync.push(&identity, &vault).await
    }

    /// Current credential per username for the URL's host.
    pub async fn credentials_for_url(
        &self,
        url: &str,
    ) -> Result<Option<BTreeMap<String, CredentialEntry>>> {
        let vault = self.vault().await?;
        let vault = vault.read().await;
        Ok(vault.keystore.current_credentials_matching(url).map(|current| {
            current
                .into_iter()
                .map(|(username, entry)| (username.to_string(), entry.clone()))
                .collect()
        }))
    }

    pub async fn keystore_snapshot(&self) -> Result<Keystore> {
        let vault = self.vault().await?;
        let snapshot = vault.read().await.keystore.clone();
        Ok(snapshot)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<HostSummary>> {
        let vault = self.vault().await?;
        let found = vault.read().await.keystore.search(query);
        Ok(found)
    }

    /// Pull from the server and merge.
    pub async fn sync_now(&self) -> Result<PullOutcome> {
        let identity = self.identity().await?;
        let vault = self.vault().await?;
        self.inner.sync.pull(&identity, &vault).await
    }

    pub async fn push_now(&self) -> Result<KeystoreTag> {
        let identity = self.identity().await?;
        let vault = self.vault().await?;
        self.inner.sync.push(&identity, &vault).await
    }
}
