//! Per-round aggregation of partial signatures.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use aeon_core::{BeaconError, ParticipantId, Result};
use aeon_crypto::{recover_signature, Signature};

/// The random value produced by one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entropy {
    round: u64,
    value: [u8; 32],
}

impl Entropy {
    /// The round this entropy belongs to.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// The 32-byte random value.
    pub fn value(&self) -> &[u8; 32] {
        &self.value
    }

    /// The value narrowed to a u64, little endian over the first eight
    /// bytes. Convenience for consumers that want a number.
    pub fn as_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.value[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Rebuild from announced parts; `None` unless `value` is 32 bytes.
    pub(crate) fn from_parts(round: u64, value: &[u8]) -> Option<Self> {
        let value: [u8; 32] = value.try_into().ok()?;
        Some(Self { round, value })
    }
}

/// Collects verified partial signatures for one round and recovers the
/// group signature once a quorum is present.
///
/// Shares must be verified before they are added; the aggregator only
/// deduplicates and interpolates.
pub struct Round {
    round: u64,
    seed: Vec<u8>,
    threshold: usize,
    shares: BTreeMap<u64, Signature>,
    signature: Option<Signature>,
    entropy: Option<[u8; 32]>,
}

impl Round {
    /// Start collecting for `round`, whose members sign `seed` and whose
    /// quorum is `threshold`.
    pub fn new(round: u64, seed: Vec<u8>, threshold: usize) -> Self {
        Self {
            round,
            seed,
            threshold,
            shares: BTreeMap::new(),
            signature: None,
            entropy: None,
        }
    }

    /// Round number.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// The seed members sign for this round.
    pub fn seed(&self) -> &[u8] {
        &self.seed
    }

    /// Quorum size for this round.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record a verified partial signature. A second share under the
    /// same index is ignored; returns whether the share was added.
    pub fn add_share(&mut self, id: ParticipantId, signature: Signature) -> bool {
        if self.shares.contains_key(&id.value()) {
            return false;
        }
        self.shares.insert(id.value(), signature);
        true
    }

    /// Number of distinct shares collected.
    pub fn num_shares(&self) -> usize {
        self.shares.len()
    }

    /// Whether the group signature has been recovered.
    pub fn has_signature(&self) -> bool {
        self.signature.is_some()
    }

    /// The recovered group signature, once present.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Interpolate the group signature from the first quorum of shares
    /// and derive the round's entropy from it.
    ///
    /// Idempotent once recovered. Fails with `NotReady` below quorum.
    pub fn recover_signature(&mut self) -> Result<()> {
        if self.signature.is_some() {
            return Ok(());
        }
        if self.shares.len() < self.threshold {
            return Err(BeaconError::not_ready(format!(
                "round {}: {} of {} shares",
                self.round,
                self.shares.len(),
                self.threshold
            )));
        }

        let quorum: Vec<(ParticipantId, Signature)> = self
            .shares
            .iter()
            .take(self.threshold)
            .map(|(&id, &sig)| Ok((ParticipantId::new(id)?, sig)))
            .collect::<Result<_>>()?;
        let signature = recover_signature(&quorum, self.threshold)
            .map_err(|e| BeaconError::invariant(format!("round {}: {e}", self.round)))?;

        self.entropy = Some(derive_entropy(&signature));
        self.signature = Some(signature);
        Ok(())
    }

    /// The round's entropy, once the signature is recovered.
    pub fn entropy(&self) -> Result<Entropy> {
        self.entropy
            .map(|value| Entropy {
                round: self.round,
                value,
            })
            .ok_or_else(|| {
                BeaconError::not_ready(format!("round {} not recovered", self.round))
            })
    }
}

/// Entropy is the double SHA-256 of the recovered signature bytes.
pub(crate) fn derive_entropy(signature: &Signature) -> [u8; 32] {
    let first = Sha256::digest(signature.to_bytes());
    Sha256::digest(first).into()
}
