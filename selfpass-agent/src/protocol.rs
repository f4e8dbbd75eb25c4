//! Wire schema for the `/pair`, `/hello` and `/request` endpoints.
//!
//! Every outer envelope carries `version`. Inner messages are closed enums so
//! a reply that matches no variant is a protocol error, not a silent default.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::crypto::{b64, Sealed, Signature};
use crate::error::{Result, SelfpassError};
use crate::identity::{DeviceId, UserId};
use crate::sync::KeystoreTag;

pub const PROTOCOL_VERSION: u32 = 1;

pub const PAIR_PATH: &str = "/pair";
pub const HELLO_PATH: &str = "/hello";
pub const REQUEST_PATH: &str = "/request";

fn check_version(version: u32) -> Result<()> {
    if version != PROTOCOL_VERSION {
        return Err(SelfpassError::Protocol(format!(
            "unsupported protocol version {} (expected {})",
            version, PROTOCOL_VERSION
        )));
    }
    Ok(())
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| SelfpassError::Protocol(format!("malformed message: {}", e)))
}

// ---------------------------------------------------------------------------
// /pair
// ---------------------------------------------------------------------------

/// Sealed under the expanded access key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum PairRequest {
    RegisterDevice {
        device_id: DeviceId,
        #[serde(with = "b64")]
        public_key: Vec<u8>,
    },
}

/// POST body for `/pair`. `user_id` and `access_key_id` travel in the clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairEnvelope {
    pub version: u32,
    pub user_id: UserId,
    pub access_key_id: String,
    #[serde(flatten)]
    pub sealed: Sealed,
}

impl PairEnvelope {
    pub fn new(user_id: UserId, access_key_id: String, sealed: Sealed) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            user_id,
            access_key_id,
            sealed,
        }
    }

    pub fn check_version(&self) -> Result<()> {
        check_version(self.version)
    }
}

/// Decrypted `/pair` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResponse {
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,
}

// ---------------------------------------------------------------------------
// /hello
// ---------------------------------------------------------------------------

/// Device half of the handshake, before base64 encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,
}

/// Server half of the handshake, before base64 encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReplyPayload {
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,
    pub session_id: String,
}

/// POST body for `/hello`. `signature` covers the bytes of `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    pub version: u32,
    pub payload: String,
    pub signature: Signature,
    pub user_id: UserId,
    pub device_id: DeviceId,
}

impl HelloRequest {
    pub fn check_version(&self) -> Result<()> {
        check_version(self.version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResponse {
    pub payload: String,
    pub signature: Signature,
}

/// base64(JSON(payload)), the exact string that gets signed.
pub fn encode_signed_payload<T: Serialize>(payload: &T) -> Result<String> {
    Ok(STANDARD.encode(serde_json::to_vec(payload)?))
}

pub fn decode_signed_payload<T: DeserializeOwned>(payload: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| SelfpassError::Protocol(format!("payload is not base64: {}", e)))?;
    decode(&bytes)
}

// ---------------------------------------------------------------------------
// /request
// ---------------------------------------------------------------------------

/// POST body for `/request`: an `ApplicationRequest` sealed under the
/// one-time session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedRequest {
    pub version: u32,
    #[serde(flatten)]
    pub sealed: Sealed,
    pub session_id: String,
}

impl SealedRequest {
    pub fn new(sealed: Sealed, session_id: String) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sealed,
            session_id,
        }
    }

    pub fn check_version(&self) -> Result<()> {
        check_version(self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", content = "data", rename_all = "kebab-case")]
pub enum ApplicationRequest {
    UpdateKeystore(UpdateKeystore),
    RetrieveKeystore(RetrieveKeystore),
}

impl ApplicationRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::UpdateKeystore(_) => "update-keystore",
            Self::RetrieveKeystore(_) => "retrieve-keystore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateKeystore {
    /// The serialized keystore sealed under the master key.
    pub keystore: Sealed,
    pub user_id: UserId,
    pub based_on: Option<KeystoreTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveKeystore {
    pub current: Option<KeystoreTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "UPPERCASE")]
pub enum UpdateKeystoreResult {
    Ok,
    Outdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetrieveKeystoreResult {
    Current { response: CurrentMarker },
    Data { data: Sealed },
}

/// The literal `"CURRENT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentMarker {
    #[serde(rename = "CURRENT")]
    Current,
}

impl RetrieveKeystoreResult {
    pub fn current() -> Self {
        Self::Current {
            response: CurrentMarker::Current,
        }
    }
}
