use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::crypto::Sealed;

/// Version marker for a server-held keystore snapshot.
///
/// Equal to the AEAD tag of the snapshot it names, but only ever compared for
/// equality. It is never used to check integrity; decryption does that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeystoreTag(String);

impl KeystoreTag {
    /// The tag naming a sealed snapshot.
    pub fn of(sealed: &Sealed) -> Self {
        Self(STANDARD.encode(&sealed.tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeystoreTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
