//! Per-cabinet threshold key state.

use std::collections::BTreeMap;

use bls12_381::{G2Projective, Scalar};
use ff::Field;
use group::Curve;
use rand_core::{CryptoRng, RngCore};

use aeon_core::{Identity, ParticipantId};

use crate::error::{CryptoError, CryptoResult};
use crate::polynomial::{
    evaluate_polynomial, random_polynomial, verify_share, VerificationVector,
};
use crate::primitives::{hash_to_g1, verify_signature, PublicKey, SecretShare, Signature};

/// Holds one member's view of a single DKG run and the key material that
/// falls out of it.
///
/// A manager is bound to one cabinet. Starting a new cabinet means
/// building a new manager (or calling [`reset`](Self::reset), which is
/// the same thing); nothing survives across runs, including the
/// participant index, which is sampled fresh.
///
/// Lifecycle: register every member with
/// [`insert_member`](Self::insert_member), deal with
/// [`generate_contribution`](Self::generate_contribution) /
/// [`share_for`](Self::share_for), absorb peers' deals with
/// [`add_share`](Self::add_share), then assemble keys with
/// [`create_key_pair`](Self::create_key_pair).
pub struct ThresholdKeyManager {
    identity: Identity,
    participant_id: ParticipantId,
    cabinet_size: u32,
    threshold: u32,
    members: BTreeMap<Identity, ParticipantId>,
    indices: BTreeMap<ParticipantId, Identity>,
    polynomial: Option<Vec<Scalar>>,
    verification_vector: Option<VerificationVector>,
    received: BTreeMap<Identity, (SecretShare, VerificationVector)>,
    secret_share: Option<Scalar>,
    group_public_key: Option<PublicKey>,
    member_public_shares: BTreeMap<ParticipantId, G2Projective>,
}

impl ThresholdKeyManager {
    /// Start a fresh run for a cabinet of `cabinet_size` with signing
    /// threshold `threshold`. Samples this member's participant index
    /// and registers it.
    pub fn new<R: RngCore + CryptoRng>(
        identity: Identity,
        cabinet_size: u32,
        threshold: u32,
        rng: &mut R,
    ) -> CryptoResult<Self> {
        if threshold == 0 || threshold > cabinet_size {
            return Err(CryptoError::InsufficientShares {
                required: threshold as usize,
                got: cabinet_size as usize,
            });
        }
        let participant_id = ParticipantId::random(rng);
        let mut manager = Self {
            identity,
            participant_id,
            cabinet_size,
            threshold,
            members: BTreeMap::new(),
            indices: BTreeMap::new(),
            polynomial: None,
            verification_vector: None,
            received: BTreeMap::new(),
            secret_share: None,
            group_public_key: None,
            member_public_shares: BTreeMap::new(),
        };
        manager.members.insert(identity, participant_id);
        manager.indices.insert(participant_id, identity);
        Ok(manager)
    }

    /// Discard all state and start over for a new cabinet shape.
    pub fn reset<R: RngCore + CryptoRng>(
        &mut self,
        cabinet_size: u32,
        threshold: u32,
        rng: &mut R,
    ) -> CryptoResult<()> {
        *self = Self::new(self.identity, cabinet_size, threshold, rng)?;
        Ok(())
    }

    /// This member's network identity.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// This member's index for the current run.
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    /// Signing threshold t.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Cabinet size n.
    pub fn cabinet_size(&self) -> u32 {
        self.cabinet_size
    }

    /// Registered members and their indices.
    pub fn members(&self) -> &BTreeMap<Identity, ParticipantId> {
        &self.members
    }

    /// The index a member registered under, if any.
    pub fn participant_of(&self, identity: &Identity) -> Option<ParticipantId> {
        self.members.get(identity).copied()
    }

    /// The shared group public key, once keys are assembled.
    pub fn group_public_key(&self) -> Option<&PublicKey> {
        self.group_public_key.as_ref()
    }

    /// Bind a member identity to its claimed participant index.
    ///
    /// Idempotent for identical registrations. A second registration
    /// under a different index, or an index already claimed by another
    /// identity, is a conflict and leaves existing state untouched.
    pub fn insert_member(&mut self, identity: Identity, id: ParticipantId) -> CryptoResult<()> {
        if let Some(existing) = self.members.get(&identity) {
            if *existing == id {
                return Ok(());
            }
            return Err(CryptoError::ConflictingRegistration);
        }
        if self.indices.contains_key(&id) {
            return Err(CryptoError::ConflictingRegistration);
        }
        if self.members.len() as u32 >= self.cabinet_size {
            return Err(CryptoError::CabinetFull);
        }
        self.members.insert(identity, id);
        self.indices.insert(id, identity);
        Ok(())
    }

    /// Deal this member's contribution: sample the polynomial, commit to
    /// it, and make one share per registered member available through
    /// [`share_for`](Self::share_for).
    ///
    /// Requires the member set to be complete so every counterparty gets
    /// a share.
    pub fn generate_contribution<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> CryptoResult<()> {
        if self.members.len() as u32 != self.cabinet_size {
            return Err(CryptoError::ContributionUnavailable(
                "member set is not complete",
            ));
        }
        let polynomial = random_polynomial(self.threshold, rng);
        self.verification_vector = Some(VerificationVector::from_coefficients(&polynomial));
        self.polynomial = Some(polynomial);
        Ok(())
    }

    /// Commitments to this member's dealt polynomial.
    pub fn verification_vector(&self) -> CryptoResult<&VerificationVector> {
        self.verification_vector
            .as_ref()
            .ok_or(CryptoError::ContributionUnavailable("not generated yet"))
    }

    /// The share this member dealt for `to`.
    pub fn share_for(&self, to: &Identity) -> CryptoResult<SecretShare> {
        let polynomial = self
            .polynomial
            .as_ref()
            .ok_or(CryptoError::ContributionUnavailable("not generated yet"))?;
        let id = self.members.get(to).ok_or(CryptoError::UnknownMember)?;
        let x = Scalar::from(id.value());
        Ok(SecretShare(evaluate_polynomial(polynomial, &x)))
    }

    /// Accept a dealer's share for this member together with the dealer's
    /// verification vector.
    ///
    /// The share must verify against the vector at this member's index.
    /// Resubmitting an identical share is a no-op; a different share from
    /// the same dealer is a conflict.
    pub fn add_share(
        &mut self,
        from: &Identity,
        share: SecretShare,
        vector: VerificationVector,
    ) -> CryptoResult<()> {
        if !self.members.contains_key(from) {
            return Err(CryptoError::UnknownMember);
        }
        if vector.len() != self.threshold as usize {
            return Err(CryptoError::WrongVectorLength {
                expected: self.threshold as usize,
                got: vector.len(),
            });
        }
        if let Some((existing_share, existing_vector)) = self.received.get(from) {
            if *existing_share == share && *existing_vector == vector {
                return Ok(());
            }
            return Err(CryptoError::ConflictingShare);
        }
        if !verify_share(&share, self.participant_id, &vector) {
            return Err(CryptoError::InvalidShare);
        }
        self.received.insert(*from, (share, vector));
        Ok(())
    }

    /// Assemble the key material once a share from every cabinet member
    /// (including this one) has been accepted.
    ///
    /// Every stored share is re-checked; a failure here means local state
    /// was corrupted after acceptance and the run must be abandoned. On
    /// success the manager holds the secret share `x_i = sum_d f_d(i)`,
    /// the group public key `sum_d V_d[0]`, and a public key share for
    /// every member, and returns the group public key.
    pub fn create_key_pair(&mut self) -> CryptoResult<PublicKey> {
        if self.received.len() as u32 != self.cabinet_size {
            return Err(CryptoError::InsufficientShares {
                required: self.cabinet_size as usize,
                got: self.received.len(),
            });
        }

        let mut secret = Scalar::ZERO;
        let mut group = G2Projective::identity();
        for (share, vector) in self.received.values() {
            if !verify_share(share, self.participant_id, vector) {
                return Err(CryptoError::RevalidationFailed);
            }
            secret += share.0;
            group += vector.constant_term();
        }

        let mut public_shares = BTreeMap::new();
        for &id in self.indices.keys() {
            let mut acc = G2Projective::identity();
            for (_, vector) in self.received.values() {
                acc += vector.evaluate(id);
            }
            public_shares.insert(id, acc);
        }

        let group_key = PublicKey(group.to_affine());
        self.secret_share = Some(secret);
        self.group_public_key = Some(group_key);
        self.member_public_shares = public_shares;
        Ok(group_key)
    }

    /// Produce this member's partial signature over `message`.
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Signature> {
        let secret = self.secret_share.ok_or(CryptoError::KeysNotGenerated)?;
        Ok(Signature((hash_to_g1(message) * secret).to_affine()))
    }

    /// Check a recovered group signature against the group public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<bool> {
        let key = self.group_public_key.ok_or(CryptoError::KeysNotGenerated)?;
        Ok(verify_signature(&key, message, signature))
    }

    /// The public key share bound to a member index, once keys exist.
    ///
    /// Copyable, so callers that must not hold a lock during pairing
    /// checks can take the key out and verify elsewhere.
    pub fn public_key_share(&self, id: ParticipantId) -> Option<PublicKey> {
        self.member_public_shares
            .get(&id)
            .map(|share_key| PublicKey(share_key.to_affine()))
    }

    /// Check a partial signature against the claimed member's public key
    /// share. Pairing check, not cheap; callers keep it out of locks.
    pub fn verify_signature_share(
        &self,
        id: ParticipantId,
        message: &[u8],
        signature: &Signature,
    ) -> CryptoResult<bool> {
        if self.group_public_key.is_none() {
            return Err(CryptoError::KeysNotGenerated);
        }
        let key = self
            .public_key_share(id)
            .ok_or(CryptoError::UnknownMember)?;
        Ok(verify_signature(&key, message, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::recover_signature;
    use rand::rngs::OsRng;

    /// Run a complete in-process DKG and return the finished managers.
    fn run_dkg(n: u32, t: u32) -> Vec<ThresholdKeyManager> {
        let mut rng = OsRng;
        let mut managers: Vec<ThresholdKeyManager> = (0..n)
            .map(|_| {
                ThresholdKeyManager::new(Identity::random(&mut rng), n, t, &mut rng).unwrap()
            })
            .collect();

        let roster: Vec<(Identity, ParticipantId)> = managers
            .iter()
            .map(|m| (m.identity(), m.participant_id()))
            .collect();
        for manager in &mut managers {
            for &(identity, id) in &roster {
                manager.insert_member(identity, id).unwrap();
            }
            manager.generate_contribution(&mut rng).unwrap();
        }

        for dealer_idx in 0..n as usize {
            let dealer_identity = managers[dealer_idx].identity();
            let vector = managers[dealer_idx].verification_vector().unwrap().clone();
            let deals: Vec<(Identity, SecretShare)> = roster
                .iter()
                .map(|(identity, _)| {
                    (*identity, managers[dealer_idx].share_for(identity).unwrap())
                })
                .collect();
            for manager in &mut managers {
                let (_, share) = deals
                    .iter()
                    .find(|(identity, _)| *identity == manager.identity())
                    .unwrap();
                manager
                    .add_share(&dealer_identity, *share, vector.clone())
                    .unwrap();
            }
        }

        for manager in &mut managers {
            manager.create_key_pair().unwrap();
        }
        managers
    }

    #[test]
    fn all_members_agree_on_group_key() {
        let managers = run_dkg(4, 2);
        let key = managers[0].group_public_key().unwrap().to_bytes();
        for manager in &managers[1..] {
            assert_eq!(manager.group_public_key().unwrap().to_bytes(), key);
        }
    }

    #[test]
    fn disjoint_quorums_recover_identical_signatures() {
        // n = 4, t = 2: subsets {1, 3} and {2, 4} must agree byte for
        // byte, and the result must verify under the group key.
        let managers = run_dkg(4, 2);
        let message = b"hello world";

        let partial = |idx: usize| {
            (
                managers[idx].participant_id(),
                managers[idx].sign(message).unwrap(),
            )
        };

        let sig_a = recover_signature(&[partial(0), partial(2)], 2).unwrap();
        let sig_b = recover_signature(&[partial(1), partial(3)], 2).unwrap();
        assert_eq!(sig_a.to_bytes(), sig_b.to_bytes());
        assert!(managers[0].verify(message, &sig_a).unwrap());
        assert!(!managers[0].verify(b"other message", &sig_a).unwrap());
    }

    #[test]
    fn partial_signatures_verify_against_member_shares() {
        let managers = run_dkg(3, 2);
        let message = b"round seed";
        let sig = managers[1].sign(message).unwrap();

        let id = managers[1].participant_id();
        assert!(managers[0].verify_signature_share(id, message, &sig).unwrap());
        // A share claimed under the wrong index fails the pairing check.
        let wrong_id = managers[2].participant_id();
        assert!(!managers[0]
            .verify_signature_share(wrong_id, message, &sig)
            .unwrap());
    }

    #[test]
    fn bad_share_is_rejected_and_good_one_is_idempotent() {
        let mut rng = OsRng;
        let managers = run_dkg(3, 2);
        let dealer = &managers[1];
        let mut receiver =
            ThresholdKeyManager::new(Identity::random(&mut rng), 3, 2, &mut rng).unwrap();
        // Rebuild a tiny roster so the dealer is known to the receiver.
        receiver
            .insert_member(dealer.identity(), dealer.participant_id())
            .unwrap();

        let vector = dealer.verification_vector().unwrap().clone();
        let bogus = SecretShare(crate::primitives::random_scalar(&mut rng));
        assert_eq!(
            receiver.add_share(&dealer.identity(), bogus, vector),
            Err(CryptoError::InvalidShare)
        );
    }

    #[test]
    fn conflicting_share_from_same_dealer_is_rejected() {
        let mut rng = OsRng;
        let n = 3u32;
        let t = 2u32;
        let mut managers: Vec<ThresholdKeyManager> = (0..n)
            .map(|_| {
                ThresholdKeyManager::new(Identity::random(&mut rng), n, t, &mut rng).unwrap()
            })
            .collect();
        let roster: Vec<(Identity, ParticipantId)> = managers
            .iter()
            .map(|m| (m.identity(), m.participant_id()))
            .collect();
        for manager in &mut managers {
            for &(identity, id) in &roster {
                manager.insert_member(identity, id).unwrap();
            }
            manager.generate_contribution(&mut rng).unwrap();
        }

        let dealer_identity = managers[1].identity();
        let vector = managers[1].verification_vector().unwrap().clone();
        let receiver_identity = managers[0].identity();
        let share = managers[1].share_for(&receiver_identity).unwrap();

        managers[0]
            .add_share(&dealer_identity, share, vector.clone())
            .unwrap();
        // Same deal again: fine.
        managers[0]
            .add_share(&dealer_identity, share, vector.clone())
            .unwrap();
        // Different share under the same dealer: conflict.
        let other = SecretShare(crate::primitives::random_scalar(&mut rng));
        assert_eq!(
            managers[0].add_share(&dealer_identity, other, vector),
            Err(CryptoError::ConflictingShare)
        );
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let mut rng = OsRng;
        let mut manager =
            ThresholdKeyManager::new(Identity::random(&mut rng), 3, 2, &mut rng).unwrap();
        let peer = Identity::random(&mut rng);
        let id_a = ParticipantId::new(1000).unwrap();
        let id_b = ParticipantId::new(2000).unwrap();

        manager.insert_member(peer, id_a).unwrap();
        manager.insert_member(peer, id_a).unwrap();
        assert_eq!(
            manager.insert_member(peer, id_b),
            Err(CryptoError::ConflictingRegistration)
        );
        // Another identity claiming an already-taken index.
        assert_eq!(
            manager.insert_member(Identity::random(&mut rng), id_a),
            Err(CryptoError::ConflictingRegistration)
        );
    }

    #[test]
    fn key_assembly_requires_all_shares() {
        let mut rng = OsRng;
        let mut manager =
            ThresholdKeyManager::new(Identity::random(&mut rng), 3, 2, &mut rng).unwrap();
        assert!(matches!(
            manager.create_key_pair(),
            Err(CryptoError::InsufficientShares { .. })
        ));
        assert_eq!(manager.sign(b"m"), Err(CryptoError::KeysNotGenerated));
    }
}
