use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum SelfpassError {
    /// The server's handshake signature did not verify against the key
    /// trusted at pairing time.
    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    /// An AEAD tag did not verify. Corruption or tampering.
    #[error("Integrity failure: {0}")]
    IntegrityFailure(String),

    /// The master password could not open the cached keystore.
    #[error("Incorrect master password")]
    WrongCredential,

    #[error("Device is not paired")]
    NotPaired,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Device is already paired as {0}")]
    AlreadyPaired(String),

    #[error("Keystore update still outdated after {0} attempts")]
    SyncRetriesExhausted(u32),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SelfpassError {
    /// Stable code for programmatic handling on the other side of `dispatch`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure(_) => "AUTHENTICATION_FAILURE",
            Self::IntegrityFailure(_) => "INTEGRITY_FAILURE",
            Self::WrongCredential => "WRONG_CREDENTIAL",
            Self::NotPaired => "NOT_PAIRED",
            Self::NotLoggedIn => "NOT_LOGGED_IN",
            Self::AlreadyPaired(_) => "ALREADY_PAIRED",
            Self::SyncRetriesExhausted(_) => "SYNC_RETRIES_EXHAUSTED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Errors a UI is expected to handle: a wrong password, or an operation
    /// attempted in the wrong pairing/login state.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::WrongCredential | Self::NotPaired | Self::NotLoggedIn | Self::AlreadyPaired(_)
        )
    }
}

impl From<CryptoError> for SelfpassError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::TagMismatch => {
                SelfpassError::IntegrityFailure("authentication tag mismatch".into())
            }
            CryptoError::InvalidKey(msg) => SelfpassError::Crypto(format!("Invalid key: {}", msg)),
            CryptoError::Encryption(msg) => SelfpassError::Crypto(msg),
        }
    }
}

impl From<reqwest::Error> for SelfpassError {
    fn from(err: reqwest::Error) -> Self {
        SelfpassError::Transport(err.to_string())
    }
}

impl serde::Serialize for SelfpassError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SelfpassError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, SelfpassError>;
