//! Wire messages exchanged between cabinet members.
//!
//! Curve points and scalars travel as length-checked byte vectors; the
//! typed forms only exist after decoding, so malformed bytes are rejected
//! at the edge and never reach protocol logic.

use serde::{Deserialize, Serialize};

use aeon_core::{BeaconError, Identity, Result};
use aeon_crypto::{SecretShare, Signature, VerificationVector};

/// A member announcing the participant index it will use for one
/// cabinet generation's setup.
///
/// The announcement is not self-authenticating: it carries no signature
/// over `identity`. The router instead requires the transport-reported
/// sender to match `identity` and drops announcements where the two
/// disagree, so authenticity rests on the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabinetMemberDetails {
    /// The cabinet generation this announcement belongs to.
    pub generation: u64,
    /// The announcing member.
    pub identity: Identity,
    /// Its claimed nonzero participant index.
    pub participant_id: u64,
}

/// One dealer's share for the receiving member, together with the
/// dealer's verification vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSubmission {
    /// The cabinet generation this share belongs to.
    pub generation: u64,
    /// The dealing member.
    pub from: Identity,
    /// Scalar share encoding, 32 bytes.
    pub share: Vec<u8>,
    /// Compressed G2 commitments, 96 bytes each, threshold many.
    pub verification_vector: Vec<Vec<u8>>,
}

impl ShareSubmission {
    /// Decode the share and vector into their typed forms.
    pub fn decode(&self) -> Result<(SecretShare, VerificationVector)> {
        let share = SecretShare::from_bytes(&self.share)
            .map_err(|e| BeaconError::malformed(format!("share from {}: {e}", self.from)))?;
        let vector = VerificationVector::from_bytes(&self.verification_vector)
            .map_err(|e| BeaconError::malformed(format!("vector from {}: {e}", self.from)))?;
        Ok((share, vector))
    }
}

/// A member's partial signature over one round's seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureShare {
    /// Round the share belongs to.
    pub round: u64,
    /// The signer's participant index.
    pub participant_id: u64,
    /// Compressed G1 partial signature, 48 bytes.
    pub signature: Vec<u8>,
}

impl SignatureShare {
    /// Decode the partial signature.
    pub fn decode(&self) -> Result<Signature> {
        Signature::from_bytes(&self.signature).map_err(|e| {
            BeaconError::malformed(format!(
                "signature share for round {}: {e}",
                self.round
            ))
        })
    }
}

/// A finished round announced to peers: the recovered group signature
/// and the entropy derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntropyRecord {
    /// The finished round.
    pub round: u64,
    /// The seed that was signed.
    pub seed: Vec<u8>,
    /// Compressed recovered group signature, 48 bytes.
    pub signature: Vec<u8>,
    /// Double SHA-256 of the signature, 32 bytes.
    pub entropy: Vec<u8>,
}

/// Everything the beacon puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    /// Setup: participant index announcement.
    MemberDetails(CabinetMemberDetails),
    /// Setup: directed share delivery.
    Share(ShareSubmission),
    /// Entropy: partial signature for a round.
    SignatureShare(SignatureShare),
    /// Entropy: finished round announcement.
    Entropy(EntropyRecord),
}

impl Envelope {
    /// Serialize for the transport.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BeaconError::malformed(format!("encode: {e}")))
    }

    /// Deserialize an inbound payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        bincode::deserialize(payload).map_err(|e| BeaconError::malformed(format!("decode: {e}")))
    }
}
