use std::num::NonZeroU32;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use ring::pbkdf2;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::keys::{IV_SIZE, TAG_SIZE};
use super::{
    AgreementKeyPair, CryptoError, CryptoProvider, Sealed, Signature, SigningKeyPair,
    SymmetricKey,
};

/// PBKDF2 iteration count used by the server for access and master keys.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Domain label mixed into the one-time session key.
const SESSION_KEY_LABEL: &[u8] = b"selfpass-session-v1";

/// Production primitives: AES-256-GCM, SHA-256, PBKDF2-HMAC-SHA256,
/// Ed25519 signatures and X25519 key agreement.
#[derive(Debug, Clone)]
pub struct SystemCrypto {
    kdf_iterations: u32,
}

impl SystemCrypto {
    pub fn new() -> Self {
        Self::with_kdf_iterations(DEFAULT_KDF_ITERATIONS)
    }

    pub fn with_kdf_iterations(kdf_iterations: u32) -> Self {
        Self { kdf_iterations }
    }

    fn random_32(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }
}

impl Default for SystemCrypto {
    fn default() -> Self {
        Self::new()
    }
}

fn to_array_32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("{} must be 32 bytes", what)))
}

impl CryptoProvider for SystemCrypto {
    fn hash(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    fn pbkdf(&self, password: &str, salt: &str) -> Result<SymmetricKey, CryptoError> {
        let iterations = NonZeroU32::new(self.kdf_iterations)
            .ok_or_else(|| CryptoError::InvalidKey("iterations must be non-zero".into()))?;

        let mut key_bytes = [0u8; 32];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt.as_bytes(),
            password.as_bytes(),
            &mut key_bytes,
        );

        let key = SymmetricKey::from_bytes(key_bytes);
        key_bytes.zeroize();
        Ok(key)
    }

    fn aead_encrypt(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Sealed, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let mut iv = [0u8; IV_SIZE];
        rand::rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let mut ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        // aes-gcm appends the tag; the wire format carries it separately
        let tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);

        Ok(Sealed {
            ciphertext,
            tag,
            iv: iv.to_vec(),
        })
    }

    fn aead_decrypt(&self, key: &SymmetricKey, sealed: &Sealed) -> Result<Vec<u8>, CryptoError> {
        if sealed.iv.len() != IV_SIZE || sealed.tag.len() != TAG_SIZE {
            return Err(CryptoError::TagMismatch);
        }

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_SIZE);
        combined.extend_from_slice(&sealed.ciphertext);
        combined.extend_from_slice(&sealed.tag);

        cipher
            .decrypt(Nonce::from_slice(&sealed.iv), combined.as_ref())
            .map_err(|_| CryptoError::TagMismatch)
    }

    fn generate_signing_keypair(&self) -> SigningKeyPair {
        let mut seed = self.random_32();
        let signing_key = SigningKey::from_bytes(&seed);
        let public = signing_key.verifying_key().to_bytes().to_vec();
        let pair = SigningKeyPair::new(public, seed.to_vec());
        seed.zeroize();
        pair
    }

    fn sign(&self, keypair: &SigningKeyPair, message: &[u8]) -> Result<Signature, CryptoError> {
        let mut seed = to_array_32(keypair.secret_key(), "Signing key")?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        let signature = signing_key.sign(message);
        Ok(Signature::from_bytes(&signature.to_bytes()))
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &Signature) -> bool {
        let Ok(public_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&public_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.to_bytes().as_slice()) else {
            return false;
        };

        let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &signature).is_ok()
    }

    fn generate_agreement_keypair(&self) -> AgreementKeyPair {
        let mut secret_bytes = self.random_32();
        let secret = StaticSecret::from(secret_bytes);
        let public = PublicKey::from(&secret);
        let pair = AgreementKeyPair::new(public.as_bytes().to_vec(), secret_bytes.to_vec());
        secret_bytes.zeroize();
        pair
    }

    fn derive_shared_key(
        &self,
        ours: &AgreementKeyPair,
        their_public: &[u8],
    ) -> Result<SymmetricKey, CryptoError> {
        let our_secret = StaticSecret::from(to_array_32(ours.secret_key(), "Private key")?);
        let their_public = PublicKey::from(to_array_32(their_public, "Public key")?);

        let shared_secret = our_secret.diffie_hellman(&their_public);
        if !shared_secret.was_contributory() {
            return Err(CryptoError::InvalidKey(
                "peer public key is a low-order point".into(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(SESSION_KEY_LABEL);
        hasher.update(shared_secret.as_bytes());
        Ok(SymmetricKey::from_bytes(hasher.finalize().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto() -> SystemCrypto {
        SystemCrypto::with_kdf_iterations(10)
    }

    #[test]
    fn test_hash_deterministic() {
        let c = crypto();
        assert_eq!(c.hash(b"test"), c.hash(b"test"));
        assert_ne!(c.hash(b"test"), c.hash(b"different"));
    }

    #[test]
    fn test_aead_round_trip() {
        let c = crypto();
        let key = SymmetricKey::from_bytes([3u8; 32]);
        for plaintext in [&b""[..], b"some text", &[0u8; 1000][..]] {
            let sealed = c.aead_encrypt(&key, plaintext).unwrap();
            assert_eq!(sealed.tag.len(), TAG_SIZE);
            assert_eq!(sealed.iv.len(), IV_SIZE);
            assert_eq!(c.aead_decrypt(&key, &sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_aead_fails_closed_on_tampering() {
        let c = crypto();
        let key = SymmetricKey::from_bytes([3u8; 32]);
        let sealed = c.aead_encrypt(&key, b"some text").unwrap();

        let mut bad = sealed.clone();
        bad.ciphertext[0] ^= 1;
        assert_eq!(c.aead_decrypt(&key, &bad), Err(CryptoError::TagMismatch));

        let mut bad = sealed.clone();
        bad.tag[15] ^= 1;
        assert_eq!(c.aead_decrypt(&key, &bad), Err(CryptoError::TagMismatch));

        let mut bad = sealed.clone();
        bad.iv[0] ^= 1;
        assert_eq!(c.aead_decrypt(&key, &bad), Err(CryptoError::TagMismatch));

        let other = SymmetricKey::from_bytes([4u8; 32]);
        assert_eq!(c.aead_decrypt(&other, &sealed), Err(CryptoError::TagMismatch));
    }

    #[test]
    fn test_pbkdf_deterministic_and_salted() {
        let c = crypto();
        let a = c.pbkdf("password", "salt").unwrap();
        let b = c.pbkdf("password", "salt").unwrap();
        let other_salt = c.pbkdf("password", "pepper").unwrap();
        let other_password = c.pbkdf("passw0rd", "salt").unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), other_salt.as_bytes());
        assert_ne!(a.as_bytes(), other_password.as_bytes());
    }

    #[test]
    fn test_pbkdf_rejects_zero_iterations() {
        let c = SystemCrypto::with_kdf_iterations(0);
        assert!(c.pbkdf("password", "salt").is_err());
    }

    #[test]
    fn test_sign_verify() {
        let c = crypto();
        let pair = c.generate_signing_keypair();
        let other = c.generate_signing_keypair();
        let sig = c.sign(&pair, b"message").unwrap();

        assert!(c.verify(pair.public_key(), b"message", &sig));
        assert!(!c.verify(pair.public_key(), b"messagf", &sig));
        assert!(!c.verify(other.public_key(), b"message", &sig));

        let mut bad = sig.clone();
        bad.s[0] ^= 1;
        assert!(!c.verify(pair.public_key(), b"message", &bad));
        assert!(!c.verify(&[1, 2, 3], b"message", &sig));
    }

    #[test]
    fn test_key_agreement() {
        let c = crypto();
        let alice = c.generate_agreement_keypair();
        let bob = c.generate_agreement_keypair();
        let charlie = c.generate_agreement_keypair();

        let alice_bob = c.derive_shared_key(&alice, bob.public_key()).unwrap();
        let bob_alice = c.derive_shared_key(&bob, alice.public_key()).unwrap();
        let alice_charlie = c.derive_shared_key(&alice, charlie.public_key()).unwrap();

        assert_eq!(alice_bob.as_bytes(), bob_alice.as_bytes());
        assert_ne!(alice_bob.as_bytes(), alice_charlie.as_bytes());
    }

    #[test]
    fn test_key_agreement_rejects_bad_public_key() {
        let c = crypto();
        let alice = c.generate_agreement_keypair();
        assert!(c.derive_shared_key(&alice, &[1u8; 16]).is_err());
        assert!(c.derive_shared_key(&alice, &[0u8; 32]).is_err());
    }
}
