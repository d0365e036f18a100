use std::collections::BTreeMap;

use frost_secp256k1::{
    self as frost, Identifier, VerifyingKey,
    keys::{KeyPackage, PublicKeyPackage, dkg},
    rand_core::{CryptoRng, OsRng, RngCore},
    round1::SigningNonces,
};
use tracing::{debug, warn};
use types::errors::TssError;

use crate::key_manager::ThresholdKeySet;

mod dkg_rounds;
mod signing;
pub mod wire;

pub use wire::{Commitment, CommitmentList, SignatureShare};

/// Maps a base58 transport identity onto its FROST participant identifier.
pub fn identity_to_identifier(identity: &str) -> Result<Identifier, TssError> {
    let bytes = bs58::decode(identity)
        .into_vec()
        .map_err(|e| TssError::InvalidIdentity(format!("{identity}: {e}")))?;
    if bytes.is_empty() {
        return Err(TssError::InvalidIdentity("empty identity".into()));
    }
    Identifier::derive(&bytes).map_err(|e| TssError::InvalidIdentity(format!("{identity}: {e}")))
}

#[must_use]
pub fn identifier_hex(identifier: &Identifier) -> String {
    hex::encode(identifier.serialize())
}

#[derive(Default)]
struct DkgSecrets {
    round1: Option<dkg::round1::SecretPackage>,
    round2: Option<dkg::round2::SecretPackage>,
}

/// Per-participant FROST state: DKG secrets while a ceremony runs, the
/// finalized key afterwards, and the single-use nonces behind every
/// commitment handed out.
pub struct Signer<R = OsRng> {
    identity: String,
    identifier: Identifier,
    threshold: u16,
    participants: u16,
    rng: R,
    dkg: DkgSecrets,
    key_package: Option<KeyPackage>,
    public_key_package: Option<PublicKeyPackage>,
    // keyed by the encoded public commitment
    nonces: BTreeMap<Vec<u8>, SigningNonces>,
}

impl Signer<OsRng> {
    pub fn new(identity: &str, threshold: u16, participants: u16) -> Result<Self, TssError> {
        Self::with_rng(identity, threshold, participants, OsRng)
    }
}

impl<R: RngCore + CryptoRng> Signer<R> {
    pub fn with_rng(
        identity: &str,
        threshold: u16,
        participants: u16,
        rng: R,
    ) -> Result<Self, TssError> {
        if threshold == 0 || threshold > participants {
            return Err(TssError::DkgInconsistent(format!(
                "threshold {threshold} out of range for {participants} participants"
            )));
        }
        Ok(Self {
            identity: identity.to_string(),
            identifier: identity_to_identifier(identity)?,
            threshold,
            participants,
            rng,
            dkg: DkgSecrets::default(),
            key_package: None,
            public_key_package: None,
            nonces: BTreeMap::new(),
        })
    }

    /// Installs a key produced elsewhere (loaded from disk or imported).
    pub fn install_key_set(&mut self, key_set: &ThresholdKeySet) -> Result<(), TssError> {
        key_set.validate()?;
        if key_set.threshold != self.threshold || key_set.participants != self.participants {
            warn!(
                "Threshold key is {}-of-{}, overriding configured {}-of-{}",
                key_set.threshold, key_set.participants, self.threshold, self.participants
            );
        }
        if let Some(package) = &key_set.public_key_package {
            if package.verifying_shares().get(&self.identifier) != Some(&key_set.public_share) {
                return Err(TssError::KeyCorrupt(
                    "Public key package does not hold this node's public share".into(),
                ));
            }
        }

        self.threshold = key_set.threshold;
        self.participants = key_set.participants;
        self.key_package = Some(KeyPackage::new(
            self.identifier,
            key_set.secret_share.clone(),
            key_set.public_share.clone(),
            key_set.group_public_key.clone(),
            key_set.threshold,
        ));
        self.public_key_package = key_set.public_key_package.clone();
        self.nonces.clear();
        debug!("Installed threshold key for {}", self.identity);
        Ok(())
    }

    #[must_use]
    pub fn key_set(&self) -> Option<ThresholdKeySet> {
        self.key_package.as_ref().map(|key_package| ThresholdKeySet {
            threshold: *key_package.min_signers(),
            participants: self.participants,
            secret_share: key_package.signing_share().clone(),
            public_share: key_package.verifying_share().clone(),
            group_public_key: key_package.verifying_key().clone(),
            public_key_package: self.public_key_package.clone(),
        })
    }

    #[must_use]
    pub fn group_public_key(&self) -> Option<VerifyingKey> {
        self.key_package
            .as_ref()
            .map(|key_package| key_package.verifying_key().clone())
    }

    #[must_use]
    pub const fn has_key(&self) -> bool {
        self.key_package.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub const fn identifier(&self) -> Identifier {
        self.identifier
    }

    #[must_use]
    pub const fn threshold(&self) -> u16 {
        self.threshold
    }

    #[must_use]
    pub const fn participants(&self) -> u16 {
        self.participants
    }

    /// Number of commitments whose nonces are still unspent.
    #[must_use]
    pub fn pending_nonces(&self) -> usize {
        self.nonces.len()
    }

    /// Drops the nonces behind `commitment` without signing. Returns whether any were held.
    pub fn discard_nonces(&mut self, commitment: &Commitment) -> bool {
        commitment
            .encode()
            .is_ok_and(|key| self.nonces.remove(&key).is_some())
    }
}

fn frost_error(context: &str) -> impl FnOnce(frost::Error) -> TssError + '_ {
    move |e| TssError::DkgInconsistent(format!("{context}: {e}"))
}
