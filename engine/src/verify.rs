//! Message hashes signed by executors and the default proof verifier.
//!
//! Commits and reveals are authorized by a proof over a message hash that
//! binds the submission to the chain it targets. Deployments that predate
//! the current format additionally bind the submission to the address of the
//! contract that used to host the engine ([Domain::Legacy]).

use crate::{Error, ProofVerifier};
use commonware_codec::DecodeExt;
use commonware_cryptography::{ed25519, Verifier};
use commonware_utils::hex;
use oracle_primitives::{hash, Commitment, Identity, RequestId, RevealBody, DIGEST_LENGTH};
use thiserror::Error as ThisError;

const COMMIT_PREFIX: &[u8] = b"commit_data_result";
const REVEAL_PREFIX: &[u8] = b"reveal_data_result";

/// Domain separation appended to every message hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Domain {
    #[default]
    Current,
    Legacy {
        contract: String,
    },
}

impl Domain {
    fn suffix(&self) -> &[u8] {
        match self {
            Self::Current => &[],
            Self::Legacy { contract } => contract.as_bytes(),
        }
    }
}

/// Hash an executor signs to commit to `commitment`.
pub fn commit_message_hash(
    id: &RequestId,
    posted_height: u64,
    commitment: &Commitment,
    chain_id: &str,
    domain: &Domain,
) -> [u8; DIGEST_LENGTH] {
    hash(&[
        COMMIT_PREFIX,
        hex(id.as_ref()).as_bytes(),
        &posted_height.to_be_bytes(),
        commitment.as_ref(),
        chain_id.as_bytes(),
        domain.suffix(),
    ])
}

/// Hash an executor signs to reveal `body`.
pub fn reveal_message_hash(
    body: &RevealBody,
    chain_id: &str,
    domain: &Domain,
) -> [u8; DIGEST_LENGTH] {
    hash(&[
        REVEAL_PREFIX,
        &body.hash(),
        chain_id.as_bytes(),
        domain.suffix(),
    ])
}

/// Verify `proof` over `message` with `verifier`.
pub(crate) fn verify<V: ProofVerifier>(
    verifier: &V,
    identity: &Identity,
    message: &[u8],
    proof: &[u8],
) -> Result<(), Error> {
    verifier
        .verify(identity, message, proof)
        .map_err(|err| Error::InvalidProof(err.to_string()))
}

/// Errors returned by [Ed25519Verifier].
#[derive(Debug, ThisError)]
pub enum Ed25519Error {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature does not match")]
    Mismatch,
}

/// Treats identities as ed25519 public keys and proofs as signatures.
#[derive(Clone, Debug, Default)]
pub struct Ed25519Verifier;

impl ProofVerifier for Ed25519Verifier {
    type Error = Ed25519Error;

    fn verify(
        &self,
        identity: &Identity,
        message: &[u8],
        proof: &[u8],
    ) -> Result<(), Ed25519Error> {
        let public_key = ed25519::PublicKey::decode(identity.as_ref())
            .map_err(|_| Ed25519Error::InvalidPublicKey(identity.to_hex()))?;
        let signature =
            ed25519::Signature::decode(proof).map_err(|_| Ed25519Error::InvalidSignature)?;
        if !public_key.verify(None, message, &signature) {
            return Err(Ed25519Error::Mismatch);
        }
        Ok(())
    }
}
