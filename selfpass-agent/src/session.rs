//! Per-request forward-secret channel.
//!
//! Every application request runs its own handshake:
//!
//! 1. `Init`: generate an ephemeral agreement keypair.
//! 2. `HelloSent`: sign the exported public key with the device's long-term
//!    key and POST it to `/hello`.
//! 3. `HelloReceived`: verify the server's signature against the key trusted
//!    at pairing, then derive the one-time key from the server's ephemeral key.
//! 4. `RequestSent`: seal the request under the one-time key, POST to `/request`.
//! 5. `Complete`: open the reply under the same key.
//!
//! Nothing survives a request. The ephemeral secret is dropped (and zeroized)
//! as soon as the one-time key exists, and the one-time key when the reply
//! has been opened.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::crypto::{CryptoProvider, Sealed, SymmetricKey};
use crate::error::{Result, SelfpassError};
use crate::identity::DeviceIdentity;
use crate::protocol::{
    self, ApplicationRequest, HelloPayload, HelloReplyPayload, HelloRequest, HelloResponse,
    SealedRequest, HELLO_PATH, PROTOCOL_VERSION, REQUEST_PATH,
};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    HelloSent,
    HelloReceived,
    RequestSent,
    Complete,
}

/// Output of a verified handshake.
struct Session {
    key: SymmetricKey,
    session_id: String,
}

pub struct SessionChannel<'a> {
    crypto: &'a dyn CryptoProvider,
    transport: &'a dyn Transport,
    identity: &'a DeviceIdentity,
}

impl<'a> SessionChannel<'a> {
    pub fn new(
        crypto: &'a dyn CryptoProvider,
        transport: &'a dyn Transport,
        identity: &'a DeviceIdentity,
    ) -> Self {
        Self {
            crypto,
            transport,
            identity,
        }
    }

    /// Run one full handshake and exchange for `request`.
    ///
    /// A bad server signature is an `AuthenticationFailure` and a reply that
    /// fails to open is an `IntegrityFailure`. Neither is retried.
    pub async fn request<R: DeserializeOwned>(&self, request: &ApplicationRequest) -> Result<R> {
        let session = self.hello().await?;
        self.exchange(session, request).await
    }

    async fn hello(&self) -> Result<Session> {
        trace_state(SessionState::Init);
        let ephemeral = self.crypto.generate_agreement_keypair();

        let payload = protocol::encode_signed_payload(&HelloPayload {
            public_key: ephemeral.public_key().to_vec(),
        })?;
        let signature = self
            .crypto
            .sign(&self.identity.signing_key, payload.as_bytes())?;

        let body = HelloRequest {
            version: PROTOCOL_VERSION,
            payload,
            signature,
            user_id: self.identity.user_id.clone(),
            device_id: self.identity.device_id.clone(),
        };

        trace_state(SessionState::HelloSent);
        let reply = self
            .transport
            .post(&self.identity.endpoint(HELLO_PATH), protocol::encode(&body)?)
            .await?;
        let reply: HelloResponse = protocol::decode(&reply)?;

        if !self.crypto.verify(
            &self.identity.server_public_key,
            reply.payload.as_bytes(),
            &reply.signature,
        ) {
            warn!("Server hello signature did not verify");
            return Err(SelfpassError::AuthenticationFailure(
                "server hello signature did not verify".into(),
            ));
        }

        let reply: HelloReplyPayload = protocol::decode_signed_payload(&reply.payload)?;
        let key = self.crypto.derive_shared_key(&ephemeral, &reply.public_key)?;
        drop(ephemeral);

        trace_state(SessionState::HelloReceived);
        Ok(Session {
            key,
            session_id: reply.session_id,
        })
    }

    async fn exchange<R: DeserializeOwned>(
        &self,
        session: Session,
        request: &ApplicationRequest,
    ) -> Result<R> {
        let sealed = self
            .crypto
            .aead_encrypt(&session.key, &protocol::encode(request)?)?;
        let body = SealedRequest::new(sealed, session.session_id.clone());

        trace_state(SessionState::RequestSent);
        debug!(
            "Sending {} in session {}",
            request.method(),
            session.session_id
        );
        let reply = self
            .transport
            .post(&self.identity.endpoint(REQUEST_PATH), protocol::encode(&body)?)
            .await?;
        let reply: Sealed = protocol::decode(&reply)?;

        let plaintext = self.crypto.aead_decrypt(&session.key, &reply).map_err(|e| {
            warn!("Reply to {} failed to open: {}", request.method(), e);
            SelfpassError::IntegrityFailure(format!("reply to {} failed to open", request.method()))
        })?;

        trace_state(SessionState::Complete);
        protocol::decode(&plaintext)
    }
}

fn trace_state(state: SessionState) {
    debug!("Session state: {:?}", state);
}
