use std::collections::{BTreeMap, BTreeSet};

use frost_secp256k1::{
    Identifier,
    keys::dkg::{self, round1, round2},
    rand_core::{CryptoRng, RngCore},
};
use tracing::{debug, info};
use types::errors::TssError;

use super::{
    DkgSecrets, Signer, frost_error, identifier_hex,
    wire::{Round1Message, Round2Share, decode_round2, encode_round2},
};
use crate::key_manager::ThresholdKeySet;

impl<R: RngCore + CryptoRng> Signer<R> {
    /// Starts a ceremony: samples this participant's secret polynomial and
    /// returns the encoded proof of knowledge and coefficient commitments.
    pub fn dkg_round1(&mut self) -> Result<Vec<u8>, TssError> {
        let (secret, package) = dkg::part1(
            self.identifier,
            self.participants,
            self.threshold,
            &mut self.rng,
        )
        .map_err(frost_error("DKG round 1"))?;

        self.dkg = DkgSecrets {
            round1: Some(secret),
            round2: None,
        };

        Round1Message {
            identifier: self.identifier,
            package,
        }
        .encode()
    }

    /// Validates every peer's round-1 message and returns the secret shares for
    /// all other participants as `sender || receiver || share` triples.
    pub fn dkg_round2(&mut self, round1_messages: &[Vec<u8>]) -> Result<Vec<u8>, TssError> {
        let result = self.dkg_round2_inner(round1_messages);
        if result.is_err() {
            self.reset_dkg();
        }
        result
    }

    fn dkg_round2_inner(&mut self, round1_messages: &[Vec<u8>]) -> Result<Vec<u8>, TssError> {
        let peers = self.collect_round1(round1_messages)?;
        let secret = self
            .dkg
            .round1
            .take()
            .ok_or_else(|| TssError::DkgInconsistent("round 2 requested before round 1".into()))?;

        let (round2_secret, packages) =
            dkg::part2(secret, &peers).map_err(frost_error("DKG round 2"))?;
        self.dkg.round2 = Some(round2_secret);

        let triples: Vec<Round2Share> = packages
            .iter()
            .map(|(receiver, package)| Round2Share {
                sender: self.identifier,
                receiver: *receiver,
                share: package.signing_share().clone(),
            })
            .collect();

        debug!("DKG round 2: produced {} secret shares", triples.len());
        Ok(encode_round2(&triples))
    }

    /// Verifies the shares addressed to this participant and derives the final
    /// key. Any inconsistency aborts the ceremony for this participant.
    pub fn dkg_finalize(
        &mut self,
        round1_messages: &[Vec<u8>],
        round2_messages: &[Vec<u8>],
    ) -> Result<ThresholdKeySet, TssError> {
        let result = self.dkg_finalize_inner(round1_messages, round2_messages);
        self.reset_dkg();
        result
    }

    fn dkg_finalize_inner(
        &mut self,
        round1_messages: &[Vec<u8>],
        round2_messages: &[Vec<u8>],
    ) -> Result<ThresholdKeySet, TssError> {
        let peers = self.collect_round1(round1_messages)?;
        let secret = self
            .dkg
            .round2
            .as_ref()
            .ok_or_else(|| TssError::DkgInconsistent("finalize requested before round 2".into()))?;

        let mut received: BTreeMap<Identifier, round2::Package> = BTreeMap::new();
        for message in round2_messages {
            for triple in decode_round2(message)? {
                if triple.receiver != self.identifier {
                    continue;
                }
                if !peers.contains_key(&triple.sender) {
                    return Err(TssError::DkgInconsistent(format!(
                        "share from {} who sent no round 1 message",
                        identifier_hex(&triple.sender)
                    )));
                }
                if received
                    .insert(triple.sender, round2::Package::new(triple.share))
                    .is_some()
                {
                    return Err(TssError::DuplicateIdentifier(identifier_hex(&triple.sender)));
                }
            }
        }

        if received.len() != peers.len() {
            return Err(TssError::DkgInconsistent(format!(
                "received {} of {} round 2 shares",
                received.len(),
                peers.len()
            )));
        }

        let (key_package, public_key_package) =
            dkg::part3(secret, &peers, &received).map_err(frost_error("DKG finalize"))?;

        self.key_package = Some(key_package);
        self.public_key_package = Some(public_key_package);
        self.nonces.clear();

        let key_set = self
            .key_set()
            .ok_or_else(|| TssError::DkgInconsistent("key package missing after finalize".into()))?;
        info!(
            "🔑 DKG complete: {}-of-{} group key {}",
            key_set.threshold,
            key_set.participants,
            key_set.group_public_key_hex()?
        );
        Ok(key_set)
    }

    /// Decodes round-1 messages from the whole group and returns the packages of
    /// every participant other than this one.
    fn collect_round1(
        &self,
        round1_messages: &[Vec<u8>],
    ) -> Result<BTreeMap<Identifier, round1::Package>, TssError> {
        let mut seen = BTreeSet::new();
        let mut peers = BTreeMap::new();

        for bytes in round1_messages {
            let message = Round1Message::decode(bytes)?;
            if !seen.insert(message.identifier) {
                return Err(TssError::DuplicateIdentifier(identifier_hex(&message.identifier)));
            }
            if message.coefficient_count() != usize::from(self.threshold) {
                return Err(TssError::DkgInconsistent(format!(
                    "{} committed to {} coefficients, expected {}",
                    identifier_hex(&message.identifier),
                    message.coefficient_count(),
                    self.threshold
                )));
            }
            if message.identifier != self.identifier {
                peers.insert(message.identifier, message.package);
            }
        }

        let expected = usize::from(self.participants) - 1;
        if peers.len() != expected {
            return Err(TssError::DkgInconsistent(format!(
                "round 1 messages from {} peers, expected {expected}",
                peers.len()
            )));
        }
        Ok(peers)
    }

    pub fn reset_dkg(&mut self) {
        self.dkg = DkgSecrets::default();
    }

    #[must_use]
    pub const fn dkg_in_progress(&self) -> bool {
        self.dkg.round1.is_some() || self.dkg.round2.is_some()
    }
}
