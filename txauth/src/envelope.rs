//! The dual-signature envelope and the exact bytes both signatures cover.

use chrono::{DateTime, Utc};
use crypto::hashes::sha256_tagged;
use crypto::{AlgorithmId, Classical, PostQuantum, TaggedSignature};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

pub const ENVELOPE_VERSION: u16 = 1;
pub const SIGNING_DOMAIN: &[u8] = b"txauth/envelope/v1";

/// Digest signed by both halves. Binds the payload hash to the envelope
/// version, the signer and the signing time (milliseconds).
pub fn signing_message(
    version: u16,
    signer: UserId,
    timestamp: DateTime<Utc>,
    payload_hash: &[u8; 32],
) -> [u8; 32] {
    sha256_tagged(
        SIGNING_DOMAIN,
        &[
            &version.to_be_bytes()[..],
            &signer.0.to_be_bytes()[..],
            &timestamp.timestamp_millis().to_be_bytes()[..],
            &payload_hash[..],
        ],
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    version: u16,
    #[serde(with = "crate::serde_bytes32")]
    payload_hash: [u8; 32],
    pq: TaggedSignature<PostQuantum>,
    classical: TaggedSignature<Classical>,
    signer: UserId,
    timestamp: DateTime<Utc>,
}

/// Owned fields of an envelope, for transports that rebuild envelopes from
/// their own framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeParts {
    pub version: u16,
    pub payload_hash: [u8; 32],
    pub pq: TaggedSignature<PostQuantum>,
    pub classical: TaggedSignature<Classical>,
    pub signer: UserId,
    pub timestamp: DateTime<Utc>,
}

impl SignatureEnvelope {
    pub fn from_parts(parts: EnvelopeParts) -> Self {
        Self {
            version: parts.version,
            payload_hash: parts.payload_hash,
            pq: parts.pq,
            classical: parts.classical,
            signer: parts.signer,
            timestamp: parts.timestamp,
        }
    }

    pub fn into_parts(self) -> EnvelopeParts {
        EnvelopeParts {
            version: self.version,
            payload_hash: self.payload_hash,
            pq: self.pq,
            classical: self.classical,
            signer: self.signer,
            timestamp: self.timestamp,
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn payload_hash(&self) -> &[u8; 32] {
        &self.payload_hash
    }

    pub fn pq_signature(&self) -> &TaggedSignature<PostQuantum> {
        &self.pq
    }

    pub fn classical_signature(&self) -> &TaggedSignature<Classical> {
        &self.classical
    }

    pub fn pq_algorithm(&self) -> AlgorithmId {
        self.pq.algorithm()
    }

    pub fn classical_algorithm(&self) -> AlgorithmId {
        self.classical.algorithm()
    }

    pub fn signer(&self) -> UserId {
        self.signer
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Hex of the payload hash. Used as the transaction id in audit records.
    pub fn transaction_id(&self) -> String {
        hex::encode(self.payload_hash)
    }

    pub fn signing_message(&self) -> [u8; 32] {
        signing_message(self.version, self.signer, self.timestamp, &self.payload_hash)
    }
}
