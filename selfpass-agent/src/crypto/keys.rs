//! Key material and AEAD envelope types.
//!
//! This module provides:
//! - `SymmetricKey`: a 256-bit key wrapper that zeroizes on drop
//! - `SigningKeyPair` / `AgreementKeyPair`: raw asymmetric key bytes
//! - `Sealed`: AEAD output split into ciphertext, tag and IV
//! - `Signature`: a signature split into its `r` and `s` halves

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

/// AES-GCM nonce size (96 bits)
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Serde adapter for byte fields carried as standard base64 strings.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// A 256-bit symmetric key with automatic zeroization on drop.
///
/// Used for the master key, the expanded access key and the per-request
/// one-time key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; 32],
}

impl SymmetricKey {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build a key from a slice, rejecting anything but 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; 32] = slice
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", slice.len())))?;
        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Long-term signing keypair for a device.
///
/// The byte layout is defined by the `CryptoProvider` that generated it;
/// everything above the provider treats it as opaque.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKeyPair {
    public: Vec<u8>,
    secret: Vec<u8>,
}

impl SigningKeyPair {
    pub fn new(public: Vec<u8>, secret: Vec<u8>) -> Self {
        Self { public, secret }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    pub fn secret_key(&self) -> &[u8] {
        &self.secret
    }

    pub fn export(&self) -> ExportedKeyPair {
        ExportedKeyPair {
            public_key: self.public.clone(),
            private_key: self.secret.clone(),
        }
    }

    pub fn import(exported: &ExportedKeyPair) -> Self {
        Self::new(exported.public_key.clone(), exported.private_key.clone())
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &hex::encode(&self.public))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Serialized form of a `SigningKeyPair` as kept in the pairing record.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ExportedKeyPair {
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,
    #[serde(with = "b64")]
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for ExportedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedKeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Ephemeral key-agreement keypair. Lives for one handshake only.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AgreementKeyPair {
    public: Vec<u8>,
    secret: Vec<u8>,
}

impl AgreementKeyPair {
    pub fn new(public: Vec<u8>, secret: Vec<u8>) -> Self {
        Self { public, secret }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    pub fn secret_key(&self) -> &[u8] {
        &self.secret
    }
}

/// A signature carried as its two halves, `{r, s}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "b64")]
    pub r: Vec<u8>,
    #[serde(with = "b64")]
    pub s: Vec<u8>,
}

impl Signature {
    /// Split a raw signature into equal `r` and `s` halves.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let (r, s) = bytes.split_at(bytes.len() / 2);
        Self {
            r: r.to_vec(),
            s: s.to_vec(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.r.len() + self.s.len());
        out.extend_from_slice(&self.r);
        out.extend_from_slice(&self.s);
        out
    }
}

/// AEAD output: `{ciphertext, tag, iv}`, each base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
}
