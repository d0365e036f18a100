//! Fixed-width binary encodings for everything the signer puts in a payload
//! `package`. Widths come from the secp256k1 ciphersuite: scalars are 32 bytes
//! big-endian, group elements are 33-byte compressed points.

use std::collections::BTreeMap;

use frost_secp256k1::{
    self as frost, Identifier, Signature,
    keys::{SigningShare, VerifiableSecretSharingCommitment, dkg::round1},
    round1::{NonceCommitment, SigningCommitments},
    round2,
};
use types::errors::TssError;

pub const SCALAR_LEN: usize = 32;
pub const ELEMENT_LEN: usize = 33;
pub const SIGNATURE_LEN: usize = ELEMENT_LEN + SCALAR_LEN;
pub const COMMITMENT_LEN: usize = SCALAR_LEN + 2 * ELEMENT_LEN;
pub const SIGNATURE_SHARE_LEN: usize = 2 * SCALAR_LEN;
pub const ROUND1_HEADER_LEN: usize = SIGNATURE_LEN + SCALAR_LEN;
pub const ROUND2_TRIPLE_LEN: usize = 3 * SCALAR_LEN;

struct Reader<'a> {
    bytes: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, what }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TssError> {
        if self.bytes.len() < len {
            return Err(TssError::Decode(format!(
                "{} truncated: needed {len} bytes, {} left",
                self.what,
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn identifier(&mut self) -> Result<Identifier, TssError> {
        let bytes = self.take(SCALAR_LEN)?;
        Identifier::deserialize(bytes).map_err(|e| self.invalid("identifier", &e))
    }

    fn nonce_commitment(&mut self) -> Result<NonceCommitment, TssError> {
        let bytes = self.take(ELEMENT_LEN)?;
        NonceCommitment::deserialize(bytes).map_err(|e| self.invalid("nonce commitment", &e))
    }

    const fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn invalid(&self, field: &str, e: &frost::Error) -> TssError {
        TssError::Decode(format!("{}: invalid {field}: {e}", self.what))
    }

    fn finish(self) -> Result<(), TssError> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(TssError::Decode(format!(
                "{}: {} trailing bytes",
                self.what,
                self.bytes.len()
            )))
        }
    }
}

fn encode_err(what: &str) -> impl FnOnce(frost::Error) -> TssError + '_ {
    move |e| TssError::Decode(format!("Failed to encode {what}: {e}"))
}

/// One participant's public nonce commitment for one signing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub identifier: Identifier,
    pub commitments: SigningCommitments,
}

impl Commitment {
    pub fn encode(&self) -> Result<Vec<u8>, TssError> {
        let mut out = Vec::with_capacity(COMMITMENT_LEN);
        out.extend_from_slice(&self.identifier.serialize());
        out.extend(self.commitments.hiding().serialize().map_err(encode_err("hiding commitment"))?);
        out.extend(self.commitments.binding().serialize().map_err(encode_err("binding commitment"))?);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TssError> {
        let mut reader = Reader::new(bytes, "Commitment");
        let commitment = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(commitment)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, TssError> {
        let identifier = reader.identifier()?;
        let hiding = reader.nonce_commitment()?;
        let binding = reader.nonce_commitment()?;
        Ok(Self {
            identifier,
            commitments: SigningCommitments::new(hiding, binding),
        })
    }
}

/// Commitments for one session keyed (and therefore ordered) by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitmentList {
    entries: BTreeMap<Identifier, SigningCommitments>,
}

impl CommitmentList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and leaves the list unchanged if the identifier is already present.
    pub fn insert(&mut self, commitment: Commitment) -> bool {
        if self.entries.contains_key(&commitment.identifier) {
            return false;
        }
        self.entries.insert(commitment.identifier, commitment.commitments);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.entries.contains_key(identifier)
    }

    #[must_use]
    pub fn get(&self, identifier: &Identifier) -> Option<&SigningCommitments> {
        self.entries.get(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.entries.keys()
    }

    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<Identifier, SigningCommitments> {
        &self.entries
    }

    pub fn encode(&self) -> Result<Vec<u8>, TssError> {
        let mut out = Vec::with_capacity(self.entries.len() * COMMITMENT_LEN);
        for (identifier, commitments) in &self.entries {
            out.extend(
                Commitment {
                    identifier: *identifier,
                    commitments: commitments.clone(),
                }
                .encode()?,
            );
        }
        Ok(out)
    }

    /// Rejects duplicate identifiers and anything that is not a whole number of entries.
    pub fn decode(bytes: &[u8]) -> Result<Self, TssError> {
        if bytes.len() % COMMITMENT_LEN != 0 {
            return Err(TssError::Decode(format!(
                "CommitmentList length {} is not a multiple of {COMMITMENT_LEN}",
                bytes.len()
            )));
        }
        let mut reader = Reader::new(bytes, "CommitmentList");
        let mut list = Self::new();
        while reader.remaining() > 0 {
            let commitment = Commitment::read(&mut reader)?;
            let identifier = commitment.identifier;
            if !list.insert(commitment) {
                return Err(TssError::Decode(format!(
                    "CommitmentList repeats identifier {}",
                    hex::encode(identifier.serialize())
                )));
            }
        }
        reader.finish()?;
        Ok(list)
    }
}

impl FromIterator<Commitment> for CommitmentList {
    fn from_iter<I: IntoIterator<Item = Commitment>>(iter: I) -> Self {
        let mut list = Self::new();
        for commitment in iter {
            list.insert(commitment);
        }
        list
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureShare {
    pub identifier: Identifier,
    pub share: round2::SignatureShare,
}

impl SignatureShare {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNATURE_SHARE_LEN);
        out.extend_from_slice(&self.identifier.serialize());
        out.extend_from_slice(&self.share.serialize());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TssError> {
        let mut reader = Reader::new(bytes, "SignatureShare");
        let identifier = reader.identifier()?;
        let share = round2::SignatureShare::deserialize(reader.take(SCALAR_LEN)?)
            .map_err(|e| reader.invalid("share", &e))?;
        reader.finish()?;
        Ok(Self { identifier, share })
    }
}

/// `R || z || identifier || commitment_0 .. commitment_{t-1}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round1Message {
    pub identifier: Identifier,
    pub package: round1::Package,
}

impl Round1Message {
    pub fn encode(&self) -> Result<Vec<u8>, TssError> {
        let coefficients = self
            .package
            .commitment()
            .serialize()
            .map_err(encode_err("coefficient commitments"))?;

        let mut out = Vec::with_capacity(ROUND1_HEADER_LEN + coefficients.len() * ELEMENT_LEN);
        out.extend(
            self.package
                .proof_of_knowledge()
                .serialize()
                .map_err(encode_err("proof of knowledge"))?,
        );
        out.extend_from_slice(&self.identifier.serialize());
        for coefficient in coefficients {
            out.extend(coefficient);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TssError> {
        let mut reader = Reader::new(bytes, "DKG round 1");
        let proof = Signature::deserialize(reader.take(SIGNATURE_LEN)?)
            .map_err(|e| reader.invalid("proof of knowledge", &e))?;
        let identifier = reader.identifier()?;

        if reader.remaining() == 0 || reader.remaining() % ELEMENT_LEN != 0 {
            return Err(TssError::Decode(format!(
                "DKG round 1: {} commitment bytes is not a positive multiple of {ELEMENT_LEN}",
                reader.remaining()
            )));
        }
        let mut coefficients = Vec::with_capacity(reader.remaining() / ELEMENT_LEN);
        while reader.remaining() > 0 {
            coefficients.push(reader.take(ELEMENT_LEN)?.to_vec());
        }
        reader.finish()?;

        let commitment = VerifiableSecretSharingCommitment::deserialize(coefficients)
            .map_err(|e| TssError::Decode(format!("DKG round 1: invalid commitment: {e}")))?;

        Ok(Self {
            identifier,
            package: round1::Package::new(commitment, proof),
        })
    }

    /// Number of coefficient commitments, which equals the group threshold.
    #[must_use]
    pub fn coefficient_count(&self) -> usize {
        self.package
            .commitment()
            .serialize()
            .map_or(0, |coefficients| coefficients.len())
    }
}

/// One secret share travelling from `sender` to `receiver` during DKG round 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2Share {
    pub sender: Identifier,
    pub receiver: Identifier,
    pub share: SigningShare,
}

#[must_use]
pub fn encode_round2(shares: &[Round2Share]) -> Vec<u8> {
    let mut out = Vec::with_capacity(shares.len() * ROUND2_TRIPLE_LEN);
    for triple in shares {
        out.extend_from_slice(&triple.sender.serialize());
        out.extend_from_slice(&triple.receiver.serialize());
        out.extend_from_slice(&triple.share.serialize());
    }
    out
}

pub fn decode_round2(bytes: &[u8]) -> Result<Vec<Round2Share>, TssError> {
    if bytes.is_empty() || bytes.len() % ROUND2_TRIPLE_LEN != 0 {
        return Err(TssError::Decode(format!(
            "DKG round 2 length {} is not a positive multiple of {ROUND2_TRIPLE_LEN}",
            bytes.len()
        )));
    }
    let mut reader = Reader::new(bytes, "DKG round 2");
    let mut shares = Vec::with_capacity(bytes.len() / ROUND2_TRIPLE_LEN);
    while reader.remaining() > 0 {
        let sender = reader.identifier()?;
        let receiver = reader.identifier()?;
        let share = SigningShare::deserialize(reader.take(SCALAR_LEN)?)
            .map_err(|e| reader.invalid("secret share", &e))?;
        shares.push(Round2Share {
            sender,
            receiver,
            share,
        });
    }
    reader.finish()?;
    Ok(shares)
}
