//! In-memory credential server and builders shared by the protocol tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::crypto::{CryptoProvider, Sealed, SigningKeyPair, SymmetricKey, SystemCrypto};
use crate::error::{Result, SelfpassError};
use crate::identity::{DeviceId, DeviceIdentity, UserId};
use crate::keystore::Keystore;
use crate::pairing::{AccessKey, PairingProtocol};
use crate::protocol::{
    self, ApplicationRequest, HelloPayload, HelloReplyPayload, HelloRequest, HelloResponse,
    PairEnvelope, PairRequest, PairResponse, RetrieveKeystoreResult, SealedRequest,
    UpdateKeystore, UpdateKeystoreResult, HELLO_PATH, PAIR_PATH, REQUEST_PATH,
};
use crate::storage::MemoryStore;
use crate::sync::KeystoreTag;
use crate::transport::Transport;

pub(crate) const SERVER_ADDRESS: &str = "https://selfpass.test";
pub(crate) const MASTER_PASSWORD: &str = "correct horse battery staple";
const TEST_KDF_ITERATIONS: u32 = 10;

pub(crate) fn test_config() -> AgentConfig {
    AgentConfig {
        kdf_iterations: TEST_KDF_ITERATIONS,
        max_sync_retries: 3,
        retry_backoff_ms: 1,
        retry_backoff_max_ms: 4,
        pull_on_login: false,
        ..AgentConfig::default()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ServerStats {
    pub devices: usize,
    pub hellos: usize,
    pub requests: usize,
    pub pushes: usize,
    pub pulls: usize,
    pub distinct_session_keys: usize,
}

#[derive(Default)]
struct ServerState {
    access_keys: HashMap<String, String>,
    devices: HashMap<DeviceId, (UserId, Vec<u8>)>,
    sessions: HashMap<String, (UserId, SymmetricKey)>,
    session_keys: HashSet<[u8; 32]>,
    keystores: HashMap<UserId, Sealed>,
    forced_outdated: u32,
    tamper_hello_signature: bool,
    tamper_responses: bool,
    stats: ServerStats,
}

/// Speaks the server side of `/pair`, `/hello` and `/request`.
pub(crate) struct FakeServer {
    crypto: SystemCrypto,
    signing_key: SigningKeyPair,
    state: Mutex<ServerState>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        let crypto = SystemCrypto::with_kdf_iterations(TEST_KDF_ITERATIONS);
        let signing_key = crypto.generate_signing_keypair();
        Arc::new(Self {
            crypto,
            signing_key,
            state: Mutex::new(ServerState::default()),
        })
    }

    pub fn crypto(&self) -> &SystemCrypto {
        &self.crypto
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key.public_key().to_vec()
    }

    /// A fresh combined access key in `II-ssssssss-ssssssss` form.
    pub fn issue_access_key(&self) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("{:02}", state.access_keys.len() % 100);
        let secret = hex::encode(self.crypto.random_bytes(8));
        state.access_keys.insert(id.clone(), secret.clone());
        format!("{}-{}-{}", id, &secret[..8], &secret[8..])
    }

    pub fn registered_key(&self, device_id: &DeviceId) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.devices.get(device_id).map(|(_, key)| key.clone())
    }

    pub fn stats(&self) -> ServerStats {
        let state = self.state.lock().unwrap();
        ServerStats {
            devices: state.devices.len(),
            distinct_session_keys: state.session_keys.len(),
            ..state.stats
        }
    }

    pub fn stored_tag(&self, user_id: &UserId) -> Option<KeystoreTag> {
        let state = self.state.lock().unwrap();
        state.keystores.get(user_id).map(KeystoreTag::of)
    }

    /// Answer the next `count` pushes with OUTDATED regardless of tags.
    pub fn force_outdated(&self, count: u32) {
        self.state.lock().unwrap().forced_outdated = count;
    }

    pub fn set_tamper_hello_signature(&self, on: bool) {
        self.state.lock().unwrap().tamper_hello_signature = on;
    }

    /// Corrupt every sealed reply on `/pair` and `/request`.
    pub fn set_tamper_responses(&self, on: bool) {
        self.state.lock().unwrap().tamper_responses = on;
    }

    /// Act as another device of `username`: open the stored keystore, add a
    /// credential, and store the result as a new snapshot.
    pub fn write_from_other_device(
        &self,
        username: &str,
        master_password: &str,
        url: &str,
        login: &str,
        password: &str,
    ) {
        let user_id = UserId::from_username(&self.crypto, username);
        let master_key = self.crypto.pbkdf(master_password, user_id.as_str()).unwrap();

        let mut state = self.state.lock().unwrap();
        let mut keystore = match state.keystores.get(&user_id) {
            Some(sealed) => {
                let plaintext = self.crypto.aead_decrypt(&master_key, sealed).unwrap();
                Keystore::from_serialized(std::str::from_utf8(&plaintext).unwrap()).unwrap()
            }
            None => Keystore::new(),
        };
        keystore.add_credentials(url, login, password, None);

        let sealed = self
            .crypto
            .aead_encrypt(&master_key, keystore.serialize().unwrap().as_bytes())
            .unwrap();
        state.keystores.insert(user_id, sealed);
    }

    fn seal_reply(&self, state: &ServerState, key: &SymmetricKey, reply: &[u8]) -> Result<Vec<u8>> {
        let mut sealed = self.crypto.aead_encrypt(key, reply)?;
        if state.tamper_responses {
            sealed.ciphertext[0] ^= 0x01;
        }
        protocol::encode(&sealed)
    }

    fn handle_pair(&self, body: &[u8]) -> Result<Vec<u8>> {
        let envelope: PairEnvelope = protocol::decode(body)?;
        envelope.check_version()?;

        let mut state = self.state.lock().unwrap();
        let secret = state
            .access_keys
            .get(&envelope.access_key_id)
            .cloned()
            .ok_or_else(|| SelfpassError::Transport("403 unknown access key".into()))?;
        let key = self.crypto.pbkdf(&secret, envelope.user_id.as_str())?;
        let plaintext = self
            .crypto
            .aead_decrypt(&key, &envelope.sealed)
            .map_err(|_| SelfpassError::Transport("403 forbidden".into()))?;

        let registration: PairRequest = protocol::decode(&plaintext)?;
        let PairRequest::RegisterDevice {
            device_id,
            public_key,
        } = registration;
        state.devices.insert(device_id, (envelope.user_id, public_key));

        let reply = protocol::encode(&PairResponse {
            public_key: self.public_key(),
        })?;
        self.seal_reply(&state, &key, &reply)
    }

    fn handle_hello(&self, body: &[u8]) -> Result<Vec<u8>> {
        let request: HelloRequest = protocol::decode(body)?;
        request.check_version()?;

        let mut state = self.state.lock().unwrap();
        state.stats.hellos += 1;

        let (user_id, device_key) = state
            .devices
            .get(&request.device_id)
            .cloned()
            .ok_or_else(|| SelfpassError::Transport("401 unknown device".into()))?;
        if user_id != request.user_id
            || !self
                .crypto
                .verify(&device_key, request.payload.as_bytes(), &request.signature)
        {
            return Err(SelfpassError::Transport("401 bad device signature".into()));
        }

        let hello: HelloPayload = protocol::decode_signed_payload(&request.payload)?;
        let public_key = hello.public_key;
        let ephemeral = self.crypto.generate_agreement_keypair();
        let key = self.crypto.derive_shared_key(&ephemeral, &public_key)?;
        let session_id = hex::encode(self.crypto.random_bytes(16));

        state.session_keys.insert(*key.as_bytes());
        state.sessions.insert(session_id.clone(), (user_id, key));

        let payload = protocol::encode_signed_payload(&HelloReplyPayload {
            public_key: ephemeral.public_key().to_vec(),
            session_id,
        })?;
        let mut signature = self.crypto.sign(&self.signing_key, payload.as_bytes())?;
        if state.tamper_hello_signature {
            signature.r[0] ^= 0x01;
        }

        protocol::encode(&HelloResponse { payload, signature })
    }

    fn handle_request(&self, body: &[u8]) -> Result<Vec<u8>> {
        let request: SealedRequest = protocol::decode(body)?;
        request.check_version()?;

        let mut state = self.state.lock().unwrap();
        state.stats.requests += 1;

        let (user_id, key) = state
            .sessions
            .remove(&request.session_id)
            .ok_or_else(|| SelfpassError::Transport("401 unknown session".into()))?;
        let plaintext = self.crypto.aead_decrypt(&key, &request.sealed)?;

        let application: ApplicationRequest = protocol::decode(&plaintext)?;
        let reply = match application {
            ApplicationRequest::UpdateKeystore(update) => {
                state.stats.pushes += 1;
                let result = Self::apply_update(&mut state, &user_id, update)?;
                protocol::encode(&result)?
            }
            ApplicationRequest::RetrieveKeystore(retrieve) => {
                state.stats.pulls += 1;
                let result = match state.keystores.get(&user_id) {
                    Some(sealed) if Some(KeystoreTag::of(sealed)) != retrieve.current => {
                        RetrieveKeystoreResult::Data {
                            data: sealed.clone(),
                        }
                    }
                    _ => RetrieveKeystoreResult::current(),
                };
                protocol::encode(&result)?
            }
        };

        self.seal_reply(&state, &key, &reply)
    }

    fn apply_update(
        state: &mut ServerState,
        user_id: &UserId,
        update: UpdateKeystore,
    ) -> Result<UpdateKeystoreResult> {
        if &update.user_id != user_id {
            return Err(SelfpassError::Transport("403 wrong user".into()));
        }
        if state.forced_outdated > 0 {
            state.forced_outdated -= 1;
            return Ok(UpdateKeystoreResult::Outdated);
        }

        let current = state.keystores.get(user_id).map(KeystoreTag::of);
        if update.based_on != current {
            return Ok(UpdateKeystoreResult::Outdated);
        }
        state.keystores.insert(user_id.clone(), update.keystore);
        Ok(UpdateKeystoreResult::Ok)
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let path = url
            .strip_prefix(SERVER_ADDRESS)
            .ok_or_else(|| SelfpassError::Transport(format!("no route to {}", url)))?;
        match path {
            PAIR_PATH => self.handle_pair(&body),
            HELLO_PATH => self.handle_hello(&body),
            REQUEST_PATH => self.handle_request(&body),
            other => Err(SelfpassError::Transport(format!("404 {}", other))),
        }
    }
}

/// Register a device for `username` directly through the pairing protocol.
pub(crate) async fn paired_identity(server: &FakeServer, username: &str) -> DeviceIdentity {
    let access_key = AccessKey::parse(&server.issue_access_key(), 2).unwrap();
    PairingProtocol::new(server.crypto(), server)
        .register(SERVER_ADDRESS, username, &access_key)
        .await
        .unwrap()
}

/// An unpaired agent talking to `server`, backed by `store`.
pub(crate) fn test_agent(server: &Arc<FakeServer>, store: Arc<MemoryStore>) -> Agent {
    test_agent_with(server, store, test_config())
}

pub(crate) fn test_agent_with(
    server: &Arc<FakeServer>,
    store: Arc<MemoryStore>,
    config: AgentConfig,
) -> Agent {
    Agent::with_parts(
        config,
        Arc::new(server.crypto().clone()),
        server.clone(),
        store,
    )
    .unwrap()
}

/// An agent paired as `username` and logged in with `MASTER_PASSWORD`.
pub(crate) async fn paired_agent(
    server: &Arc<FakeServer>,
    store: Arc<MemoryStore>,
    username: &str,
) -> Agent {
    let agent = test_agent(server, store);
    agent
        .pair_device(SERVER_ADDRESS, username, &server.issue_access_key(), MASTER_PASSWORD)
        .await
        .unwrap();
    agent
}
