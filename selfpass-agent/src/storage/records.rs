//! Typed records kept in the byte-map.
//!
//! Layout:
//! - `pairing`: the `PairingRecord` (JSON)
//! - `keystore/<user_id>`: the sealed keystore snapshot (JSON)
//! - `tag/<user_id>`: last-known `KeystoreTag` (JSON)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::KeyValueStore;
use crate::crypto::{b64, ExportedKeyPair, Sealed, SigningKeyPair};
use crate::error::{Result, SelfpassError};
use crate::identity::{DeviceId, DeviceIdentity, UserId};
use crate::sync::KeystoreTag;

const PAIRING_KEY: &str = "pairing";

fn keystore_key(user_id: &UserId) -> String {
    format!("keystore/{}", user_id)
}

fn tag_key(user_id: &UserId) -> String {
    format!("tag/{}", user_id)
}

/// Per-user pairing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedUser {
    pub username: String,
    pub device_id: DeviceId,
    pub keys: ExportedKeyPair,
}

/// Everything needed to rehydrate a `DeviceIdentity` at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingRecord {
    #[serde(default)]
    pub paired: bool,
    #[serde(default)]
    pub server_address: String,
    #[serde(default, with = "b64")]
    pub server_public_key: Vec<u8>,
    #[serde(default)]
    pub last_user: Option<UserId>,
    #[serde(default)]
    pub users: BTreeMap<UserId, PairedUser>,
}

impl PairingRecord {
    /// Record a freshly paired identity and make it the active user.
    pub fn insert_identity(&mut self, identity: &DeviceIdentity) {
        self.users.insert(
            identity.user_id.clone(),
            PairedUser {
                username: identity.username.clone(),
                device_id: identity.device_id.clone(),
                keys: identity.signing_key.export(),
            },
        );
        self.paired = true;
        self.server_address = identity.server_address.clone();
        self.server_public_key = identity.server_public_key.clone();
        self.last_user = Some(identity.user_id.clone());
    }

    /// The identity of the last active user, if the device is paired.
    pub fn active_identity(&self) -> Option<DeviceIdentity> {
        if !self.paired {
            return None;
        }
        let user_id = self.last_user.as_ref()?;
        let user = self.users.get(user_id)?;

        Some(DeviceIdentity {
            user_id: user_id.clone(),
            username: user.username.clone(),
            device_id: user.device_id.clone(),
            signing_key: SigningKeyPair::import(&user.keys),
            server_public_key: self.server_public_key.clone(),
            server_address: self.server_address.clone(),
        })
    }

    /// Forget a user. Returns true when no users remain.
    pub fn remove_user(&mut self, user_id: &UserId) -> bool {
        self.users.remove(user_id);
        if self.last_user.as_ref() == Some(user_id) {
            self.last_user = None;
            self.paired = false;
        }
        self.users.is_empty()
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                SelfpassError::Storage(format!("Failed to parse {}: {}", key, e))
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, &bytes)
}

pub fn load_pairing_record(store: &dyn KeyValueStore) -> Result<Option<PairingRecord>> {
    load_json(store, PAIRING_KEY)
}

pub fn save_pairing_record(store: &dyn KeyValueStore, record: &PairingRecord) -> Result<()> {
    save_json(store, PAIRING_KEY, record)?;
    debug!("Saved pairing record ({} users)", record.users.len());
    Ok(())
}

pub fn delete_pairing_record(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(PAIRING_KEY)
}

pub fn load_cached_keystore(store: &dyn KeyValueStore, user_id: &UserId) -> Result<Option<Sealed>> {
    load_json(store, &keystore_key(user_id))
}

pub fn save_cached_keystore(
    store: &dyn KeyValueStore,
    user_id: &UserId,
    sealed: &Sealed,
) -> Result<()> {
    save_json(store, &keystore_key(user_id), sealed)
}

pub fn load_keystore_tag(store: &dyn KeyValueStore, user_id: &UserId) -> Result<Option<KeystoreTag>> {
    load_json(store, &tag_key(user_id))
}

pub fn save_keystore_tag(
    store: &dyn KeyValueStore,
    user_id: &UserId,
    tag: &KeystoreTag,
) -> Result<()> {
    save_json(store, &tag_key(user_id), tag)
}

/// Drop the cached keystore and tag for a user.
pub fn delete_user_cache(store: &dyn KeyValueStore, user_id: &UserId) -> Result<()> {
    store.remove(&keystore_key(user_id))?;
    store.remove(&tag_key(user_id))
}
