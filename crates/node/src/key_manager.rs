use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use frost_secp256k1::{
    self as frost, SigningKey, VerifyingKey,
    keys::{PublicKeyPackage, SigningShare, VerifyingShare},
};
use libp2p::identity::Keypair;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::errors::TssError;

pub const IDENTITY_KEY_FILE: &str = ".peer_key.json";
pub const THRESHOLD_KEY_FILE: &str = ".frost_key.json";

/// Named blob store for long-term key material.
pub trait KeyStorage: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, TssError>;
    fn store(&self, name: &str, bytes: &[u8]) -> Result<(), TssError>;
}

/// Stores each key as a file under `root`, readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileKeyStorage {
    root: PathBuf,
}

impl FileKeyStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl KeyStorage for FileKeyStorage {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, TssError> {
        let path = self.path_of(name);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| TssError::Storage(format!("Failed to read {}: {e}", path.display())))
    }

    fn store(&self, name: &str, bytes: &[u8]) -> Result<(), TssError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            TssError::Storage(format!(
                "Failed to create key directory {}: {e}",
                self.root.display()
            ))
        })?;

        let path = self.path_of(name);
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&path)
            .map_err(|e| TssError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(bytes)
            .map_err(|e| TssError::Storage(format!("Failed to write {}: {e}", path.display())))?;

        debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStorage for MemoryKeyStorage {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, TssError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| TssError::Storage(format!("Key store lock poisoned: {e}")))?;
        Ok(entries.get(name).cloned())
    }

    fn store(&self, name: &str, bytes: &[u8]) -> Result<(), TssError> {
        self.entries
            .lock()
            .map_err(|e| TssError::Storage(format!("Key store lock poisoned: {e}")))?
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct IdentityKeyRecord {
    peer_id: String,
    peer_key: String,
}

/// Loads the node's transport identity, generating and persisting a fresh
/// ed25519 key on first start.
pub fn load_or_create_identity_key(storage: &dyn KeyStorage) -> Result<Keypair, TssError> {
    if let Some(bytes) = storage.load(IDENTITY_KEY_FILE)? {
        let record: IdentityKeyRecord = serde_json::from_slice(&bytes)
            .map_err(|e| TssError::KeyCorrupt(format!("Identity key file: {e}")))?;
        let key_bytes = BASE64
            .decode(&record.peer_key)
            .map_err(|e| TssError::KeyCorrupt(format!("Identity key is not base64: {e}")))?;
        let keypair = Keypair::from_protobuf_encoding(&key_bytes)
            .map_err(|e| TssError::KeyCorrupt(format!("Identity key encoding: {e}")))?;

        let peer_id = keypair.public().to_peer_id().to_base58();
        if peer_id != record.peer_id {
            return Err(TssError::KeyCorrupt(format!(
                "Stored peer id {} does not match key (derived {peer_id})",
                record.peer_id
            )));
        }

        debug!("Loaded identity {peer_id}");
        return Ok(keypair);
    }

    let keypair = Keypair::generate_ed25519();
    let key_bytes = keypair
        .to_protobuf_encoding()
        .map_err(|e| TssError::Storage(format!("Failed to encode identity key: {e}")))?;
    let record = IdentityKeyRecord {
        peer_id: keypair.public().to_peer_id().to_base58(),
        peer_key: BASE64.encode(key_bytes),
    };
    let encoded = serde_json::to_vec_pretty(&record)
        .map_err(|e| TssError::Storage(format!("Failed to serialize identity key: {e}")))?;
    storage.store(IDENTITY_KEY_FILE, &encoded)?;

    info!("Generated new identity {}", record.peer_id);
    Ok(keypair)
}

/// A finalized threshold key, as held by one participant.
#[derive(Clone, Debug)]
pub struct ThresholdKeySet {
    pub threshold: u16,
    pub participants: u16,
    pub secret_share: SigningShare,
    pub public_share: VerifyingShare,
    pub group_public_key: VerifyingKey,
    /// Every participant's public share. Present when the key came out of DKG.
    pub public_key_package: Option<PublicKeyPackage>,
}

#[derive(Serialize, Deserialize)]
struct ThresholdKeyRecord {
    threshold: u16,
    participants: u16,
    secret_key: String,
    public_key: String,
    group_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key_package: Option<String>,
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, TssError> {
    BASE64
        .decode(value)
        .map_err(|e| TssError::KeyCorrupt(format!("Field {name} is not base64: {e}")))
}

fn corrupt<E: std::fmt::Display>(name: &'static str) -> impl FnOnce(E) -> TssError {
    move |e| TssError::KeyCorrupt(format!("Field {name}: {e}"))
}

/// Public share implied by a secret share.
pub fn public_share_of(secret_share: &SigningShare) -> Result<VerifyingShare, TssError> {
    let signing_key = SigningKey::deserialize(&secret_share.serialize())
        .map_err(|e| TssError::KeyCorrupt(format!("Secret share is not a valid scalar: {e}")))?;
    let bytes = VerifyingKey::from(&signing_key)
        .serialize()
        .map_err(|e| TssError::KeyCorrupt(e.to_string()))?;
    VerifyingShare::deserialize(&bytes).map_err(|e| TssError::KeyCorrupt(e.to_string()))
}

impl ThresholdKeySet {
    pub fn validate(&self) -> Result<(), TssError> {
        if self.threshold == 0 || self.threshold > self.participants {
            return Err(TssError::KeyCorrupt(format!(
                "Threshold {} out of range for {} participants",
                self.threshold, self.participants
            )));
        }
        if public_share_of(&self.secret_share)? != self.public_share {
            return Err(TssError::KeyCorrupt(
                "Public share does not match secret share".into(),
            ));
        }
        if let Some(package) = &self.public_key_package {
            if package.verifying_key() != &self.group_public_key {
                return Err(TssError::KeyCorrupt(
                    "Public key package belongs to a different group key".into(),
                ));
            }
        }
        Ok(())
    }

    fn to_record(&self) -> Result<ThresholdKeyRecord, TssError> {
        let storage_err = |e: frost::Error| TssError::Storage(format!("Failed to encode key: {e}"));

        let public_key_package = self
            .public_key_package
            .as_ref()
            .map(|package| package.serialize().map(|bytes| BASE64.encode(bytes)))
            .transpose()
            .map_err(storage_err)?;

        Ok(ThresholdKeyRecord {
            threshold: self.threshold,
            participants: self.participants,
            secret_key: BASE64.encode(self.secret_share.serialize()),
            public_key: BASE64.encode(self.public_share.serialize().map_err(storage_err)?),
            group_public_key: BASE64.encode(self.group_public_key.serialize().map_err(storage_err)?),
            public_key_package,
        })
    }

    fn from_record(record: &ThresholdKeyRecord) -> Result<Self, TssError> {
        let secret_share = SigningShare::deserialize(&decode_field("secret_key", &record.secret_key)?)
            .map_err(corrupt("secret_key"))?;
        let public_share = VerifyingShare::deserialize(&decode_field("public_key", &record.public_key)?)
            .map_err(corrupt("public_key"))?;
        let group_public_key =
            VerifyingKey::deserialize(&decode_field("group_public_key", &record.group_public_key)?)
                .map_err(corrupt("group_public_key"))?;
        let public_key_package = record
            .public_key_package
            .as_deref()
            .map(|encoded| {
                PublicKeyPackage::deserialize(&decode_field("public_key_package", encoded)?)
                    .map_err(corrupt("public_key_package"))
            })
            .transpose()?;

        let key_set = Self {
            threshold: record.threshold,
            participants: record.participants,
            secret_share,
            public_share,
            group_public_key,
            public_key_package,
        };
        key_set.validate()?;
        Ok(key_set)
    }

    /// Group public key in its compressed encoding, hex encoded.
    pub fn group_public_key_hex(&self) -> Result<String, TssError> {
        self.group_public_key
            .serialize()
            .map(hex::encode)
            .map_err(|e| TssError::KeyCorrupt(e.to_string()))
    }
}

pub fn save_threshold_key(storage: &dyn KeyStorage, key_set: &ThresholdKeySet) -> Result<(), TssError> {
    key_set.validate()?;
    let encoded = serde_json::to_vec_pretty(&key_set.to_record()?)
        .map_err(|e| TssError::Storage(format!("Failed to serialize threshold key: {e}")))?;
    storage.store(THRESHOLD_KEY_FILE, &encoded)?;
    info!(
        "💾 Saved {}-of-{} threshold key",
        key_set.threshold, key_set.participants
    );
    Ok(())
}

/// `Ok(None)` when no key has been provisioned yet.
pub fn load_threshold_key(storage: &dyn KeyStorage) -> Result<Option<ThresholdKeySet>, TssError> {
    let Some(bytes) = storage.load(THRESHOLD_KEY_FILE)? else {
        return Ok(None);
    };
    let record: ThresholdKeyRecord = serde_json::from_slice(&bytes)
        .map_err(|e| TssError::KeyCorrupt(format!("Threshold key file: {e}")))?;
    ThresholdKeySet::from_record(&record).map(Some)
}

/// Parses a threshold key record supplied out of band, e.g. by `import-key`.
pub fn parse_threshold_key(bytes: &[u8]) -> Result<ThresholdKeySet, TssError> {
    let record: ThresholdKeyRecord = serde_json::from_slice(bytes)
        .map_err(|e| TssError::KeyCorrupt(format!("Threshold key record: {e}")))?;
    ThresholdKeySet::from_record(&record)
}
