//! Member identity and cabinet descriptions.

use std::collections::BTreeSet;
use std::fmt;

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::errors::{BeaconError, Result};

/// Stable network identity of a node, a 32-byte public-key handle.
///
/// Unique within a cabinet; the transport addresses peers by it. Distinct
/// from [`ParticipantId`], which is only meaningful inside one DKG run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Identity([u8; 32]);

impl Identity {
    /// Wrap raw identity bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Sample a fresh identity. Test and local-composition helper; real
    /// deployments derive identities from node keys.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short hex prefix, enough to tell nodes apart in logs.
        write!(f, "{}", hex::encode(&self.0[..6]))
    }
}

/// Index under which a member participates in one DKG run.
///
/// Nonzero, since shares are polynomial evaluations and f(0) is the group
/// secret. Sampled fresh per run and bound to an [`Identity`] during the
/// ID exchange.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParticipantId(u64);

impl ParticipantId {
    /// Wrap a raw index. Fails on zero.
    pub fn new(id: u64) -> Result<Self> {
        if id == 0 {
            return Err(BeaconError::malformed("participant id must be nonzero"));
        }
        Ok(Self(id))
    }

    /// Sample a fresh nonzero index.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let id = rng.next_u64();
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Raw index value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Description of one cabinet: its member set, signing threshold, and the
/// half-open round window `[round_start, round_end)` it is responsible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cabinet {
    members: BTreeSet<Identity>,
    threshold: u32,
    round_start: u64,
    round_end: u64,
}

impl Cabinet {
    /// Build a cabinet description, validating `0 < threshold <= n` and a
    /// non-empty round window.
    pub fn new(
        members: BTreeSet<Identity>,
        threshold: u32,
        round_start: u64,
        round_end: u64,
    ) -> Result<Self> {
        let n = members.len() as u32;
        if threshold == 0 || threshold > n {
            return Err(BeaconError::malformed(format!(
                "threshold {threshold} out of range for cabinet of {n}"
            )));
        }
        if round_start >= round_end {
            return Err(BeaconError::malformed(format!(
                "empty round window [{round_start}, {round_end})"
            )));
        }
        Ok(Self {
            members,
            threshold,
            round_start,
            round_end,
        })
    }

    /// Member identities, in canonical order.
    pub fn members(&self) -> &BTreeSet<Identity> {
        &self.members
    }

    /// Whether `identity` belongs to this cabinet.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }

    /// Cabinet size.
    pub fn size(&self) -> u32 {
        self.members.len() as u32
    }

    /// Signing threshold t: any t members can recover the group signature,
    /// fewer cannot.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// First round this cabinet signs.
    pub fn round_start(&self) -> u64 {
        self.round_start
    }

    /// First round past this cabinet's window.
    pub fn round_end(&self) -> u64 {
        self.round_end
    }

    /// Whether `round` falls inside this cabinet's window.
    pub fn covers_round(&self, round: u64) -> bool {
        round >= self.round_start && round < self.round_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn members(n: usize) -> BTreeSet<Identity> {
        (0..n).map(|_| Identity::random(&mut OsRng)).collect()
    }

    #[test]
    fn cabinet_rejects_bad_threshold() {
        let m = members(4);
        assert!(Cabinet::new(m.clone(), 0, 0, 10).is_err());
        assert!(Cabinet::new(m.clone(), 5, 0, 10).is_err());
        assert!(Cabinet::new(m, 4, 0, 10).is_ok());
    }

    #[test]
    fn cabinet_rejects_empty_window() {
        let m = members(3);
        assert!(Cabinet::new(m, 2, 10, 10).is_err());
    }

    #[test]
    fn round_window_is_half_open() {
        let cabinet = Cabinet::new(members(3), 2, 5, 8).unwrap();
        assert!(!cabinet.covers_round(4));
        assert!(cabinet.covers_round(5));
        assert!(cabinet.covers_round(7));
        assert!(!cabinet.covers_round(8));
    }

    #[test]
    fn participant_id_rejects_zero() {
        assert!(ParticipantId::new(0).is_err());
        assert_eq!(ParticipantId::new(7).unwrap().value(), 7);
    }
}
