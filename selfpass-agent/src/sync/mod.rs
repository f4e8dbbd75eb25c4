//! Keystore synchronization with optimistic concurrency.
//!
//! The server accepts a push only when its `based_on` tag names the snapshot
//! it currently holds. Otherwise it answers OUTDATED and the engine pulls the
//! newer snapshot, merges it into the live keystore, and pushes again. The
//! number of retries is bounded by `RetryPolicy`.

mod tag;
mod vault;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use tag::KeystoreTag;
pub use vault::{SharedVault, UnlockedVault};

use crate::config::RetryPolicy;
use crate::crypto::{CryptoProvider, Sealed};
use crate::error::{Result, SelfpassError};
use crate::identity::{DeviceIdentity, UserId};
use crate::keystore::Keystore;
use crate::protocol::{
    ApplicationRequest, RetrieveKeystore, RetrieveKeystoreResult, UpdateKeystore,
    UpdateKeystoreResult,
};
use crate::session::SessionChannel;
use crate::storage::{save_cached_keystore, save_keystore_tag, KeyValueStore};
use crate::transport::Transport;

/// Result of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The server holds the snapshot we already have.
    Current,
    /// A newer snapshot was merged in.
    Merged(KeystoreTag),
}

pub struct SyncEngine {
    crypto: Arc<dyn CryptoProvider>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
    /// At most one push or pull in flight per process.
    in_flight: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            crypto,
            transport,
            store,
            policy,
            in_flight: Mutex::new(()),
        }
    }

    /// Push the live keystore, reconciling on OUTDATED. Returns the tag the
    /// server accepted.
    pub async fn push(&self, identity: &DeviceIdentity, vault: &SharedVault) -> Result<KeystoreTag> {
        let _guard = self.in_flight.lock().await;
        let channel = SessionChannel::new(self.crypto.as_ref(), self.transport.as_ref(), identity);

        for attempt in 0..=self.policy.max_retries {
            let (sealed, based_on) = {
                let vault = vault.read().await;
                (vault.seal(self.crypto.as_ref())?, vault.tag.clone())
            };

            let request = ApplicationRequest::UpdateKeystore(UpdateKeystore {
                keystore: sealed.clone(),
                user_id: identity.user_id.clone(),
                based_on,
            });

            match channel.request::<UpdateKeystoreResult>(&request).await? {
                UpdateKeystoreResult::Ok => {
                    let tag = KeystoreTag::of(&sealed);
                    // Reseal from live content: edits made while the request was
                    // out must not be overwritten by the snapshot we sent.
                    let mut vault = vault.write().await;
                    vault.tag = Some(tag.clone());
                    self.persist(&identity.user_id, &vault)?;
                    info!("Keystore accepted by server (attempt {})", attempt + 1);
                    return Ok(tag);
                }
                UpdateKeystoreResult::Outdated => {
                    warn!("Keystore push outdated (attempt {})", attempt + 1);
                    if attempt == self.policy.max_retries {
                        break;
                    }

                    if let Some((remote, tag)) = self.fetch_remote(&channel, vault).await? {
                        let mut vault = vault.write().await;
                        vault.keystore.merge(&remote);
                        vault.tag = Some(tag);
                        self.persist(&identity.user_id, &vault)?;
                    }

                    let delay = self.policy.delay_for(attempt);
                    debug!("Retrying push in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(SelfpassError::SyncRetriesExhausted(self.policy.max_retries + 1))
    }

    /// Pull the server snapshot and merge it into the live keystore.
    pub async fn pull(&self, identity: &DeviceIdentity, vault: &SharedVault) -> Result<PullOutcome> {
        let _guard = self.in_flight.lock().await;
        let channel = SessionChannel::new(self.crypto.as_ref(), self.transport.as_ref(), identity);

        match self.fetch_remote(&channel, vault).await? {
            None => {
                debug!("Keystore is current");
                Ok(PullOutcome::Current)
            }
            Some((remote, tag)) => {
                let mut vault = vault.write().await;
                vault.keystore.merge(&remote);
                vault.tag = Some(tag.clone());
                self.persist(&identity.user_id, &vault)?;
                info!("Merged server keystore ({} entries)", remote.entry_count());
                Ok(PullOutcome::Merged(tag))
            }
        }
    }

    /// Seal the live keystore and write it, with its tag, to the local cache.
    pub fn persist(&self, user_id: &UserId, vault: &UnlockedVault) -> Result<Sealed> {
        let sealed = vault.seal(self.crypto.as_ref())?;
        save_cached_keystore(self.store.as_ref(), user_id, &sealed)?;
        if let Some(tag) = &vault.tag {
            save_keystore_tag(self.store.as_ref(), user_id, tag)?;
        }
        Ok(sealed)
    }

    /// Retrieve the server snapshot without touching local state. `None`
    /// when the server says our tag is current.
    async fn fetch_remote(
        &self,
        channel: &SessionChannel<'_>,
        vault: &SharedVault,
    ) -> Result<Option<(Keystore, KeystoreTag)>> {
        let current = vault.read().await.tag.clone();
        let request = ApplicationRequest::RetrieveKeystore(RetrieveKeystore { current });

        let sealed = match channel.request::<RetrieveKeystoreResult>(&request).await? {
            RetrieveKeystoreResult::Current { .. } => return Ok(None),
            RetrieveKeystoreResult::Data { data } => data,
        };

        let plaintext = {
            let vault = vault.read().await;
            self.crypto
                .aead_decrypt(&vault.master_key, &sealed)
                .map_err(|e| {
                    warn!("Server keystore failed to open: {}", e);
                    SelfpassError::IntegrityFailure("server keystore failed to open".into())
                })?
        };
        let serialized = String::from_utf8(plaintext)
            .map_err(|_| SelfpassError::Protocol("server keystore is not UTF-8".into()))?;

        Ok(Some((Keystore::from_serialized(&serialized)?, KeystoreTag::of(&sealed))))
    }
}
