//! Cryptographic contracts consumed by the pairing, session and sync layers.
//!
//! Protocol code never touches a primitive directly. It goes through the
//! `CryptoProvider` trait so the handshake and sync logic can run against
//! `SystemCrypto` in production and against the same trait in tests.

pub mod keys;
mod system;

use thiserror::Error;

pub use keys::{
    b64, AgreementKeyPair, ExportedKeyPair, Sealed, Signature, SigningKeyPair, SymmetricKey,
};
pub use system::{SystemCrypto, DEFAULT_KDF_ITERATIONS};

/// Errors raised by the primitive layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD decryption failed closed: wrong key, or altered ciphertext/tag/IV.
    #[error("Authentication tag mismatch")]
    TagMismatch,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// The primitive operations the protocol needs.
pub trait CryptoProvider: Send + Sync {
    /// Collision-resistant hash (32 bytes).
    fn hash(&self, data: &[u8]) -> [u8; 32];

    fn random_bytes(&self, len: usize) -> Vec<u8>;

    /// Password-based key derivation to a 256-bit key.
    fn pbkdf(&self, password: &str, salt: &str) -> Result<SymmetricKey, CryptoError>;

    fn aead_encrypt(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Sealed, CryptoError>;

    fn aead_decrypt(&self, key: &SymmetricKey, sealed: &Sealed) -> Result<Vec<u8>, CryptoError>;

    fn generate_signing_keypair(&self) -> SigningKeyPair;

    fn sign(&self, keypair: &SigningKeyPair, message: &[u8]) -> Result<Signature, CryptoError>;

    /// Returns false for a malformed key or signature as well as a bad one.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &Signature) -> bool;

    fn generate_agreement_keypair(&self) -> AgreementKeyPair;

    /// Key agreement between our ephemeral secret and the peer's ephemeral
    /// public key, reduced to a one-time AEAD key.
    fn derive_shared_key(
        &self,
        ours: &AgreementKeyPair,
        their_public: &[u8],
    ) -> Result<SymmetricKey, CryptoError>;
}
