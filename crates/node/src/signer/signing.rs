use std::collections::BTreeMap;

use frost_secp256k1::{
    self as frost, Identifier, SigningPackage,
    keys::{PublicKeyPackage, VerifyingShare},
    rand_core::{CryptoRng, RngCore},
};
use tracing::{debug, warn};
use types::errors::TssError;

use super::{Commitment, CommitmentList, SignatureShare, Signer, identifier_hex};

impl<R: RngCore + CryptoRng> Signer<R> {
    /// Fresh nonce pair for one signing attempt. The nonces stay here until a
    /// single `sign_as_*` call consumes them or they are discarded.
    pub fn commit(&mut self) -> Result<Commitment, TssError> {
        let key_package = self.key_package.as_ref().ok_or(TssError::NoThresholdKey)?;
        let (nonces, commitments) =
            frost::round1::commit(key_package.signing_share(), &mut self.rng);

        let commitment = Commitment {
            identifier: self.identifier,
            commitments,
        };
        self.nonces.insert(commitment.encode()?, nonces);
        Ok(commitment)
    }

    pub fn sign_as_participant(
        &mut self,
        message: &[u8],
        commitments: &CommitmentList,
    ) -> Result<SignatureShare, TssError> {
        let key_package = self.key_package.as_ref().ok_or(TssError::NoThresholdKey)?;
        let own = commitments.get(&self.identifier).ok_or_else(|| {
            TssError::SessionMismatch("own commitment missing from commitment list".into())
        })?;

        let nonce_key = Commitment {
            identifier: self.identifier,
            commitments: own.clone(),
        }
        .encode()?;
        let nonces = self
            .nonces
            .remove(&nonce_key)
            .ok_or(TssError::NonceUnavailable)?;

        let signing_package = SigningPackage::new(commitments.as_map().clone(), message);
        let share = frost::round2::sign(&signing_package, &nonces, key_package)
            .map_err(|e| TssError::SessionMismatch(format!("Failed to sign: {e}")))?;

        Ok(SignatureShare {
            identifier: self.identifier,
            share,
        })
    }

    /// Adds this node's own share, aggregates and re-verifies the result against
    /// the group key. Returns the 65-byte encoded signature.
    pub fn sign_as_coordinator(
        &mut self,
        message: &[u8],
        commitments: &CommitmentList,
        shares: &[SignatureShare],
    ) -> Result<Vec<u8>, TssError> {
        let own = self.sign_as_participant(message, commitments)?;

        let mut collected = BTreeMap::new();
        for share in shares.iter().chain(std::iter::once(&own)) {
            if !commitments.contains(&share.identifier) {
                return Err(TssError::SessionMismatch(format!(
                    "share from {} who is not in the commitment list",
                    identifier_hex(&share.identifier)
                )));
            }
            if collected.insert(share.identifier, share.share.clone()).is_some() {
                return Err(TssError::DuplicateIdentifier(identifier_hex(&share.identifier)));
            }
        }

        if let Some(missing) = commitments
            .identifiers()
            .find(|identifier| !collected.contains_key(identifier))
        {
            return Err(TssError::AggregationInvalid {
                culprit: Some(identifier_hex(missing)),
                reason: "missing signature share".into(),
            });
        }

        let (public_key_package, localisable) = self.aggregation_keys(commitments)?;
        let signing_package = SigningPackage::new(commitments.as_map().clone(), message);

        let signature = frost::aggregate(&signing_package, &collected, &public_key_package)
            .map_err(|e| match &e {
                frost::Error::InvalidSignatureShare { culprit } if localisable => {
                    warn!("❌ Invalid signature share from {}", identifier_hex(culprit));
                    TssError::AggregationInvalid {
                        culprit: Some(identifier_hex(culprit)),
                        reason: e.to_string(),
                    }
                }
                _ => TssError::AggregationInvalid {
                    culprit: None,
                    reason: e.to_string(),
                },
            })?;

        public_key_package
            .verifying_key()
            .verify(message, &signature)
            .map_err(|e| TssError::AggregationInvalid {
                culprit: None,
                reason: e.to_string(),
            })?;

        debug!("Aggregated signature over {} shares", collected.len());
        signature
            .serialize()
            .map_err(|e| TssError::Decode(format!("Failed to encode signature: {e}")))
    }

    /// The group's public key package when DKG produced one. Keys provisioned
    /// out of band only know their own public share, so the other entries are
    /// filled with the group key; those are only consulted for blame after a
    /// failed verification, and blame is then withheld.
    fn aggregation_keys(
        &self,
        commitments: &CommitmentList,
    ) -> Result<(PublicKeyPackage, bool), TssError> {
        if let Some(package) = &self.public_key_package {
            return Ok((package.clone(), true));
        }

        let key_package = self.key_package.as_ref().ok_or(TssError::NoThresholdKey)?;
        let group_key = key_package.verifying_key().clone();
        let placeholder = group_key
            .serialize()
            .and_then(|bytes| VerifyingShare::deserialize(&bytes))
            .map_err(|e| TssError::KeyCorrupt(e.to_string()))?;

        let verifying_shares: BTreeMap<Identifier, VerifyingShare> = commitments
            .identifiers()
            .map(|identifier| {
                let share = if *identifier == self.identifier {
                    key_package.verifying_share().clone()
                } else {
                    placeholder.clone()
                };
                (*identifier, share)
            })
            .collect();

        Ok((PublicKeyPackage::new(verifying_shares, group_key), false))
    }
}
