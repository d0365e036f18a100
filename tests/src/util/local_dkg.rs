use std::collections::BTreeMap;

use frost_secp256k1::{
    self as frost,
    keys::dkg::{round1, round2},
    rand_core::OsRng,
};
use node::{key_manager::ThresholdKeySet, signer::identity_to_identifier};
use types::errors::TssError;

fn frost_error(e: frost::Error) -> TssError {
    TssError::DkgInconsistent(e.to_string())
}

/// Runs a dealer-less DKG entirely in memory and returns the finalized key of
/// every identity, as if each node had completed the ceremony over gossip.
pub fn generate_key_sets(
    identities: &[String],
    threshold: u16,
) -> Result<BTreeMap<String, ThresholdKeySet>, TssError> {
    let participants = u16::try_from(identities.len())
        .map_err(|e| TssError::DkgInconsistent(format!("too many participants: {e}")))?;

    let mut peers = BTreeMap::new();
    for identity in identities {
        peers.insert(identity_to_identifier(identity)?, identity.clone());
    }

    let mut round1_secrets: BTreeMap<_, round1::SecretPackage> = BTreeMap::new();
    let mut round1_packages: BTreeMap<_, round1::Package> = BTreeMap::new();
    for id in peers.keys() {
        let (secret, package) =
            frost::keys::dkg::part1(*id, participants, threshold, OsRng).map_err(frost_error)?;
        round1_secrets.insert(*id, secret);
        round1_packages.insert(*id, package);
    }

    let others = |me: &frost::Identifier| -> BTreeMap<_, round1::Package> {
        round1_packages
            .iter()
            .filter(|(id, _)| *id != me)
            .map(|(id, package)| (*id, package.clone()))
            .collect()
    };

    let mut round2_secrets: BTreeMap<_, round2::SecretPackage> = BTreeMap::new();
    let mut round2_inbox: BTreeMap<_, BTreeMap<_, round2::Package>> = BTreeMap::new();
    for (id, secret) in round1_secrets {
        let (secret, outgoing) =
            frost::keys::dkg::part2(secret, &others(&id)).map_err(frost_error)?;
        round2_secrets.insert(id, secret);
        for (receiver, package) in outgoing {
            round2_inbox.entry(receiver).or_default().insert(id, package);
        }
    }

    let mut key_sets = BTreeMap::new();
    for (id, identity) in peers {
        let secret = round2_secrets
            .get(&id)
            .ok_or_else(|| TssError::DkgInconsistent(format!("no round 2 secret for {identity}")))?;
        let inbox = round2_inbox.remove(&id).unwrap_or_default();
        let (key_package, public_key_package) =
            frost::keys::dkg::part3(secret, &others(&id), &inbox).map_err(frost_error)?;

        key_sets.insert(
            identity,
            ThresholdKeySet {
                threshold,
                participants,
                secret_share: key_package.signing_share().clone(),
                public_share: key_package.verifying_share().clone(),
                group_public_key: key_package.verifying_key().clone(),
                public_key_package: Some(public_key_package),
            },
        );
    }
    Ok(key_sets)
}

#[cfg(test)]
mod local_dkg_tests {
    use super::*;

    #[test]
    fn every_identity_gets_the_same_group_key() {
        let identities: Vec<String> = (0..3)
            .map(|_| libp2p::PeerId::random().to_base58())
            .collect();

        let key_sets = generate_key_sets(&identities, 2).unwrap();

        assert_eq!(key_sets.len(), 3);
        let group_keys: Vec<String> = key_sets
            .values()
            .map(|key_set| key_set.group_public_key_hex().unwrap())
            .collect();
        assert!(group_keys.windows(2).all(|pair| pair[0] == pair[1]));
        for key_set in key_sets.values() {
            key_set.validate().unwrap();
        }
    }
}
