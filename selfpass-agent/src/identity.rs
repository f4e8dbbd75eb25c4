use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoProvider, SigningKeyPair};

/// Size of a device identifier in bytes (256 bits).
const DEVICE_ID_SIZE: usize = 32;

/// Identifies a user to the server without revealing the username:
/// base64 of the SHA-256 of the username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn from_username(crypto: &dyn CryptoProvider, username: &str) -> Self {
        Self(STANDARD.encode(crypto.hash(username.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Random 256-bit device identifier, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn generate(crypto: &dyn CryptoProvider) -> Self {
        Self(hex::encode(crypto.random_bytes(DEVICE_ID_SIZE)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a paired device needs to authenticate to its server.
///
/// Created once by pairing, rehydrated from the pairing record at startup,
/// read-only until unpair.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub user_id: UserId,
    pub username: String,
    pub device_id: DeviceId,
    pub signing_key: SigningKeyPair,
    /// Server's long-term verification key, trusted since pairing.
    pub server_public_key: Vec<u8>,
    pub server_address: String,
}

impl DeviceIdentity {
    /// Full URL for a server endpoint such as `/hello`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server_address.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SystemCrypto;

    #[test]
    fn test_user_id_is_hash_of_username() {
        let crypto = SystemCrypto::with_kdf_iterations(1);
        let a = UserId::from_username(&crypto, "alice");
        let b = UserId::from_username(&crypto, "alice");
        let c = UserId::from_username(&crypto, "bob");

        assert_eq!(a, b);
        assert_ne!(a, c);
        // base64 of 32 bytes
        assert_eq!(a.as_str().len(), 44);
        assert!(!a.as_str().contains("alice"));
    }

    #[test]
    fn test_device_id_is_random_256_bit_hex() {
        let crypto = SystemCrypto::with_kdf_iterations(1);
        let a = DeviceId::generate(&crypto);
        let b = DeviceId::generate(&crypto);

        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let crypto = SystemCrypto::with_kdf_iterations(1);
        let identity = DeviceIdentity {
            user_id: UserId::from_username(&crypto, "alice"),
            username: "alice".into(),
            device_id: DeviceId::generate(&crypto),
            signing_key: crypto.generate_signing_keypair(),
            server_public_key: vec![],
            server_address: "https://vault.example.com/".into(),
        };
        assert_eq!(identity.endpoint("/hello"), "https://vault.example.com/hello");
    }
}
