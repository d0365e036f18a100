
use frost_secp256k1::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::signer::Signer;

pub const IDENTITIES: [&str; 3] = ["2NEpo7TZRRrLZSi2U", "6J8jK8MZYvJbTW8HD", "4gBdyMDWCBmUz9xwK"];

/// Runs a full in-process DKG between `IDENTITIES[..participants]` with RNGs
/// seeded from `seed`, returning the finalized signers in the same order.
pub fn run_dkg(threshold: u16, participants: u16, seed: u64) -> Vec<Signer<ChaCha20Rng>> {
    let mut signers: Vec<Signer<ChaCha20Rng>> = IDENTITIES[..usize::from(participants)]
        .iter()
        .zip(0u64..)
        .map(|(identity, i)| {
            Signer::with_rng(
                identity,
                threshold,
                participants,
                ChaCha20Rng::seed_from_u64(seed + i),
            )
            .unwrap()
        })
        .collect();

    let round1: Vec<Vec<u8>> = signers.iter_mut().map(|s| s.dkg_round1().unwrap()).collect();
    let round2: Vec<Vec<u8>> = signers
        .iter_mut()
        .map(|s| s.dkg_round2(&round1).unwrap())
        .collect();

    for (i, signer) in signers.iter_mut().enumerate() {
        let others: Vec<Vec<u8>> = round2
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, message)| message.clone())
            .collect();
        signer.dkg_finalize(&round1, &others).unwrap();
    }
    signers
}
