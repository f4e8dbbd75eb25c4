use std::sync::Arc;

use tokio::sync::RwLock;

use super::KeystoreTag;
use crate::crypto::{CryptoProvider, Sealed, SymmetricKey};
use crate::error::Result;
use crate::keystore::Keystore;

/// Live state while a user is logged in.
///
/// Dropping the last handle drops the master key, which zeroizes it.
#[derive(Debug)]
pub struct UnlockedVault {
    pub master_key: SymmetricKey,
    pub keystore: Keystore,
    /// Tag of the last server snapshot this keystore includes.
    pub tag: Option<KeystoreTag>,
}

/// Shared handle to the unlocked vault. Local edits and an in-flight sync
/// both mutate the same keystore through it.
pub type SharedVault = Arc<RwLock<UnlockedVault>>;

impl UnlockedVault {
    pub fn new(master_key: SymmetricKey, keystore: Keystore, tag: Option<KeystoreTag>) -> Self {
        Self {
            master_key,
            keystore,
            tag,
        }
    }

    pub fn into_shared(self) -> SharedVault {
        Arc::new(RwLock::new(self))
    }

    /// The serialized keystore sealed under the master key.
    pub fn seal(&self, crypto: &dyn CryptoProvider) -> Result<Sealed> {
        let serialized = self.keystore.serialize()?;
        Ok(crypto.aead_encrypt(&self.master_key, serialized.as_bytes())?)
    }
}
