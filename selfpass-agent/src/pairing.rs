//! One-shot device registration.
//!
//! The combined access key handed out by the server is split into a short
//! clear identifier and a secret. The secret, stretched with the user id as
//! salt, seals the registration so only a server holding the same secret can
//! read the device's public key, and only that server can answer with its own.

use tracing::{info, warn};

use crate::crypto::{CryptoProvider, Sealed};
use crate::error::{Result, SelfpassError};
use crate::identity::{DeviceId, DeviceIdentity, UserId};
use crate::protocol::{self, PairEnvelope, PairRequest, PairResponse, PAIR_PATH};
use crate::transport::Transport;

/// A combined access key split into its identifier and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKey {
    pub id: String,
    secret: String,
}

impl AccessKey {
    /// Split `combined` after `id_len` characters. Separator dashes in the
    /// secret are dropped.
    pub fn parse(combined: &str, id_len: usize) -> Result<Self> {
        let combined = combined.trim();
        let split = combined
            .char_indices()
            .nth(id_len)
            .map(|(index, _)| index)
            .ok_or_else(|| SelfpassError::InvalidInput("access key is too short".into()))?;

        let (id, rest) = combined.split_at(split);
        let secret: String = rest.chars().filter(|c| *c != '-').collect();
        if secret.is_empty() {
            return Err(SelfpassError::InvalidInput("access key has no secret".into()));
        }

        Ok(Self {
            id: id.to_string(),
            secret,
        })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKey")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

pub struct PairingProtocol<'a> {
    crypto: &'a dyn CryptoProvider,
    transport: &'a dyn Transport,
}

impl<'a> PairingProtocol<'a> {
    pub fn new(crypto: &'a dyn CryptoProvider, transport: &'a dyn Transport) -> Self {
        Self { crypto, transport }
    }

    /// Register a fresh device for `username` with the server at
    /// `server_address`. Nothing is persisted here; the caller stores the
    /// returned identity only once this succeeds.
    pub async fn register(
        &self,
        server_address: &str,
        username: &str,
        access_key: &AccessKey,
    ) -> Result<DeviceIdentity> {
        if username.is_empty() {
            return Err(SelfpassError::InvalidInput("username is empty".into()));
        }
        let server_address = normalize_address(server_address)?;

        let user_id = UserId::from_username(self.crypto, username);
        let device_id = DeviceId::generate(self.crypto);
        let expanded_key = self.crypto.pbkdf(access_key.secret(), user_id.as_str())?;
        let signing_key = self.crypto.generate_signing_keypair();

        let registration = PairRequest::RegisterDevice {
            device_id: device_id.clone(),
            public_key: signing_key.public_key().to_vec(),
        };
        let sealed = self
            .crypto
            .aead_encrypt(&expanded_key, &protocol::encode(&registration)?)?;
        let envelope = PairEnvelope::new(user_id.clone(), access_key.id.clone(), sealed);

        info!("Registering device {} with {}", device_id, server_address);
        let url = format!("{}{}", server_address, PAIR_PATH);
        let reply = self
            .transport
            .post(&url, protocol::encode(&envelope)?)
            .await?;

        let reply: Sealed = protocol::decode(&reply)?;
        let plaintext = self.crypto.aead_decrypt(&expanded_key, &reply).map_err(|e| {
            warn!("Pairing reply failed to open: {}", e);
            SelfpassError::IntegrityFailure("pairing reply failed to open".into())
        })?;
        let response: PairResponse = protocol::decode(&plaintext)?;
        let PairResponse { public_key } = response;
        if public_key.is_empty() {
            return Err(SelfpassError::Protocol("server sent an empty public key".into()));
        }

        info!("Device {} paired for user {}", device_id, user_id);
        Ok(DeviceIdentity {
            user_id,
            username: username.to_string(),
            device_id,
            signing_key,
            server_public_key: public_key,
            server_address,
        })
    }
}

fn normalize_address(address: &str) -> Result<String> {
    let parsed = url::Url::parse(address.trim())
        .map_err(|e| SelfpassError::InvalidInput(format!("bad server address: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.as_str().trim_end_matches('/').to_string()),
        other => Err(SelfpassError::InvalidInput(format!(
            "unsupported server scheme: {}",
            other
        ))),
    }
}
