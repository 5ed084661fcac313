//! Cabinet succession and the per-round entropy pipeline.
//!
//! The scheduler assigns strictly increasing generation numbers to new
//! cabinets, collects finished setups from the coordinator, and activates
//! them in generation order. While a cabinet is active it runs
//!
//! ```text
//! PREPARE_ENTROPY_GENERATION -> BROADCAST_SIGNATURE
//!     -> COLLECT_SIGNATURES -> COMPLETE -> COMMITTEE_ROTATION
//! ```
//!
//! once per round inside the cabinet's `[round_start, round_end)` window.
//! Round r's seed is round r-1's entropy; the very first round signs a
//! fixed genesis payload.
//!
//! Locking discipline matches the setup coordinator: `step` runs on one
//! driver context, `submit_signature_share` and
//! `handle_entropy_announcement` run on transport threads, and neither
//! transport sends nor pairing checks ever happen while `inner` is held.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, info, warn};

use aeon_core::{
    BeaconError, BoundedQueue, Cabinet, Identity, ParticipantId, Progress, Result,
};
use aeon_crypto::{verify_signature, PublicKey, Signature, ThresholdKeyManager};
use aeon_transport::Endpoint;

use crate::aeon::AeonExecutionUnit;
use crate::messages::{Envelope, EntropyRecord, SignatureShare};
use crate::round::{derive_entropy, Entropy, Round};
use crate::setup::CabinetSetupCoordinator;

/// Seed signed by the very first round, before any entropy exists.
pub const GENESIS_SEED: &[u8] = b"=~=~ Aeon Genesis ~=~=";

/// How many finished rounds of entropy are kept for queries.
const HISTORY_LENGTH: usize = 10;

/// How far ahead of the current round signature shares are buffered.
const READ_AHEAD: u64 = 3;

/// Buffered shares kept per future round.
const BUFFER_PER_ROUND: usize = 64;

const SIGNATURE_INBOX_CAPACITY: usize = 1024;

/// States of the entropy pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconState {
    /// No active cabinet; waiting for `switch_cabinet`.
    WaitForSetupCompletion,
    /// Open the next round and sign its seed.
    PrepareEntropyGeneration,
    /// Broadcast our partial signature.
    BroadcastSignature,
    /// Collect partial signatures until a quorum recovers.
    CollectSignatures,
    /// Publish the round's entropy and chain the next seed.
    Complete,
    /// Continue within the window or leave the cabinet.
    CommitteeRotation,
}

impl BeaconState {
    /// Stable uppercase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WaitForSetupCompletion => "WAIT_FOR_SETUP_COMPLETION",
            Self::PrepareEntropyGeneration => "PREPARE_ENTROPY_GENERATION",
            Self::BroadcastSignature => "BROADCAST_SIGNATURE",
            Self::CollectSignatures => "COLLECT_SIGNATURES",
            Self::Complete => "COMPLETE",
            Self::CommitteeRotation => "COMMITTEE_ROTATION",
        }
    }
}

impl fmt::Display for BeaconState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct ActiveCabinet {
    unit: AeonExecutionUnit,
    round: Option<Round>,
    own_share: Option<Signature>,
    next_round: u64,
    next_seed: Vec<u8>,
}

struct SchedInner {
    state: BeaconState,
    next_generation: u64,
    next_active: u64,
    skipped: BTreeSet<u64>,
    completed: BTreeMap<u64, AeonExecutionUnit>,
    active: Option<ActiveCabinet>,
    history: BTreeMap<u64, Entropy>,
    buffered: BTreeMap<u64, Vec<SignatureShare>>,
}

/// Owns cabinet succession and drives the entropy pipeline.
pub struct CabinetRotationScheduler {
    identity: Identity,
    endpoint: Arc<dyn Endpoint>,
    coordinator: Arc<CabinetSetupCoordinator>,
    sig_inbox: BoundedQueue<SignatureShare>,
    inner: Mutex<SchedInner>,
}

impl CabinetRotationScheduler {
    /// Create a scheduler bound to `coordinator`; finished setups flow
    /// back through the coordinator's ready callback.
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        coordinator: Arc<CabinetSetupCoordinator>,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            identity: endpoint.local_identity(),
            endpoint,
            coordinator,
            sig_inbox: BoundedQueue::new(SIGNATURE_INBOX_CAPACITY),
            inner: Mutex::new(SchedInner {
                state: BeaconState::WaitForSetupCompletion,
                next_generation: 0,
                next_active: 0,
                skipped: BTreeSet::new(),
                completed: BTreeMap::new(),
                active: None,
                history: BTreeMap::new(),
                buffered: BTreeMap::new(),
            }),
        });
        let weak = Arc::downgrade(&scheduler);
        scheduler
            .coordinator
            .set_beacon_ready_callback(move |unit| {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.on_setup_complete(unit);
                }
            });
        scheduler
    }

    /// Record a finished setup, keyed by generation, for a later
    /// `switch_cabinet`.
    pub fn on_setup_complete(&self, unit: AeonExecutionUnit) {
        let mut inner = self.inner.lock();
        info!(generation = unit.generation(), "cabinet setup complete");
        inner.completed.insert(unit.generation(), unit);
    }

    /// Assign the next generation to a new cabinet and queue its setup.
    /// The local node must be a member; non-members call
    /// [`skip_round`](Self::skip_round) instead. Returns the assigned
    /// generation.
    pub fn start_new_cabinet<R: RngCore + CryptoRng>(
        &self,
        members: BTreeSet<Identity>,
        threshold: u32,
        round_start: u64,
        round_end: u64,
        rng: &mut R,
    ) -> Result<u64> {
        let cabinet = Cabinet::new(members, threshold, round_start, round_end)?;
        if !cabinet.contains(&self.identity) {
            return Err(BeaconError::malformed(
                "local node is not a member of the new cabinet",
            ));
        }
        let manager = ThresholdKeyManager::new(
            self.identity,
            cabinet.size(),
            cabinet.threshold(),
            rng,
        )
        .map_err(|e| BeaconError::malformed(format!("key manager: {e}")))?;

        let generation = {
            let mut inner = self.inner.lock();
            let generation = inner.next_generation;
            inner.next_generation += 1;
            generation
        };
        info!(generation, "starting new cabinet");
        self.coordinator
            .queue_setup(AeonExecutionUnit::new(manager, cabinet, generation));
        Ok(generation)
    }

    /// Consume the next generation without building a cabinet, used when
    /// this node is not a member of the upcoming cabinet. Returns the
    /// skipped generation.
    pub fn skip_round(&self) -> u64 {
        let mut inner = self.inner.lock();
        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.skipped.insert(generation);
        info!(generation, "skipping cabinet generation");
        generation
    }

    /// Activate the next cabinet in generation order, if its setup has
    /// completed. Skipped generations are passed over; a completed unit
    /// whose generation is not next stays parked. Returns whether a
    /// cabinet was activated.
    pub fn switch_cabinet(&self) -> bool {
        let mut inner = self.inner.lock();
        loop {
            let candidate = inner.next_active;
            if inner.skipped.remove(&candidate) {
                inner.next_active += 1;
                continue;
            }
            break;
        }

        let generation = inner.next_active;
        let Some(unit) = inner.completed.remove(&generation) else {
            debug!(generation, "no completed cabinet to activate yet");
            return false;
        };

        let round_start = unit.cabinet().round_start();
        let next_seed = if round_start == 0 {
            GENESIS_SEED.to_vec()
        } else {
            match inner.history.get(&(round_start - 1)) {
                Some(previous) => previous.value().to_vec(),
                None => {
                    // Without the previous round's entropy the chain
                    // restarts from the genesis payload.
                    warn!(round_start, "no entropy for the preceding round, reseeding");
                    GENESIS_SEED.to_vec()
                }
            }
        };

        info!(
            generation,
            round_start,
            round_end = unit.cabinet().round_end(),
            "activating cabinet"
        );
        inner.active = Some(ActiveCabinet {
            unit,
            round: None,
            own_share: None,
            next_round: round_start,
            next_seed,
        });
        inner.next_active = generation + 1;
        inner.state = BeaconState::PrepareEntropyGeneration;
        self.sig_inbox.clear();
        true
    }

    /// Accept a peer's partial signature for a round. Shares for the
    /// current round are queued, shares up to [`READ_AHEAD`] rounds ahead
    /// are buffered, anything else is rejected. Returns whether the share
    /// was kept.
    pub fn submit_signature_share(&self, share: SignatureShare) -> bool {
        let mut inner = self.inner.lock();
        let Some(active) = inner.active.as_ref() else {
            debug!(round = share.round, "signature share with no active cabinet");
            return false;
        };
        let current = active.next_round;
        if share.round < current {
            debug!(round = share.round, current, "stale signature share");
            return false;
        }
        if share.round == current {
            return self.sig_inbox.push(share);
        }
        if share.round >= current + READ_AHEAD {
            debug!(round = share.round, current, "signature share too far ahead");
            return false;
        }
        let buffer = inner.buffered.entry(share.round).or_default();
        if buffer.len() >= BUFFER_PER_ROUND {
            return false;
        }
        buffer.push(share);
        true
    }

    /// Entropy for a recently finished round, while it remains in the
    /// bounded history.
    pub fn entropy(&self, round: u64) -> Result<Entropy> {
        self.inner
            .lock()
            .history
            .get(&round)
            .copied()
            .ok_or_else(|| BeaconError::not_ready(format!("no entropy for round {round}")))
    }

    /// Verify and absorb a peer's finished-round announcement. Useful
    /// for members that fell behind the quorum. Returns whether the
    /// record was accepted.
    ///
    /// Runs on the transport thread: the group key is copied out under a
    /// short lock and the pairing check runs with no lock held.
    pub fn handle_entropy_announcement(&self, record: EntropyRecord) -> bool {
        let Ok(signature) = Signature::from_bytes(&record.signature) else {
            warn!(round = record.round, "malformed entropy announcement");
            return false;
        };
        if record.entropy.as_slice() != derive_entropy(&signature).as_slice() {
            warn!(round = record.round, "entropy does not match signature");
            return false;
        }
        let Some(entropy) = Entropy::from_parts(record.round, &record.entropy) else {
            return false;
        };

        let key = {
            let inner = self.inner.lock();
            inner
                .active
                .as_ref()
                .and_then(|active| active.unit.manager().group_public_key().copied())
        };
        let Some(key) = key else {
            debug!(round = record.round, "no group key to verify announcement against");
            return false;
        };
        if !verify_signature(&key, &record.seed, &signature) {
            debug!(round = record.round, "cannot verify entropy announcement");
            return false;
        }

        let mut inner = self.inner.lock();
        inner.history.entry(record.round).or_insert(entropy);
        prune_history(&mut inner.history);
        true
    }

    /// Current pipeline state.
    pub fn state(&self) -> BeaconState {
        self.inner.lock().state
    }

    /// Generation of the active cabinet, if any.
    pub fn active_generation(&self) -> Option<u64> {
        self.inner.lock().active.as_ref().map(|a| a.unit.generation())
    }

    /// Generations whose setup finished but which have not been
    /// activated yet.
    pub fn completed_generations(&self) -> Vec<u64> {
        self.inner.lock().completed.keys().copied().collect()
    }

    /// The round the active cabinet is working on, if any.
    pub fn current_round(&self) -> Option<u64> {
        self.inner.lock().active.as_ref().map(|a| a.next_round)
    }

    /// The group public key of the active cabinet, if keys exist.
    pub fn group_public_key(&self) -> Option<PublicKey> {
        self.inner
            .lock()
            .active
            .as_ref()
            .and_then(|a| a.unit.manager().group_public_key().copied())
    }

    /// Poll the pipeline once. Mirrors the setup coordinator's contract:
    /// `Ready(state)` on a transition, `Pending` while waiting, and an
    /// error when the active cabinet had to be abandoned.
    pub fn step(&self) -> Result<Progress<BeaconState>> {
        let state = self.inner.lock().state;
        let outcome = match state {
            BeaconState::WaitForSetupCompletion => Ok(Progress::Pending),
            BeaconState::PrepareEntropyGeneration => self.on_prepare(),
            BeaconState::BroadcastSignature => self.on_broadcast_signature(),
            BeaconState::CollectSignatures => self.on_collect_signatures(),
            BeaconState::Complete => self.on_complete(),
            BeaconState::CommitteeRotation => self.on_rotation(),
        };
        match outcome {
            Ok(progress) => {
                if let Progress::Ready(state) = progress {
                    debug!(state = %state, "beacon transition");
                }
                Ok(progress)
            }
            Err(error) => {
                warn!(error = %error, "abandoning active cabinet");
                let mut inner = self.inner.lock();
                inner.active = None;
                inner.state = BeaconState::WaitForSetupCompletion;
                self.sig_inbox.clear();
                Err(error)
            }
        }
    }

    fn on_prepare(&self) -> Result<Progress<BeaconState>> {
        let mut inner = self.inner.lock();
        let round_number = {
            let active = active_mut(&mut inner)?;
            let round_number = active.next_round;
            let seed = active.next_seed.clone();
            let threshold = active.unit.cabinet().threshold() as usize;

            let own_share = active
                .unit
                .manager()
                .sign(&seed)
                .map_err(|e| BeaconError::invariant(format!("signing round seed: {e}")))?;
            active.round = Some(Round::new(round_number, seed, threshold));
            active.own_share = Some(own_share);
            round_number
        };

        // Shares that arrived before the round opened go through the
        // normal collection path.
        if let Some(buffered) = inner.buffered.remove(&round_number) {
            for share in buffered {
                if !self.sig_inbox.push(share) {
                    debug!(round = round_number, "inbox full while replaying buffered shares");
                    break;
                }
            }
        }
        // Anything buffered for rounds we already passed is dead.
        inner.buffered.retain(|round, _| *round > round_number);

        inner.state = BeaconState::BroadcastSignature;
        Ok(Progress::Ready(BeaconState::BroadcastSignature))
    }

    fn on_broadcast_signature(&self) -> Result<Progress<BeaconState>> {
        // Our own share goes into the round under the lock; the payload
        // is broadcast after it is released.
        let payload = {
            let mut inner = self.inner.lock();
            let active = active_mut(&mut inner)?;
            let own_id = active.unit.manager().participant_id();
            let own_share = active
                .own_share
                .ok_or_else(|| BeaconError::invariant("no own share to broadcast"))?;
            let round = active
                .round
                .as_mut()
                .ok_or_else(|| BeaconError::invariant("no open round"))?;

            let message = SignatureShare {
                round: round.round(),
                participant_id: own_id.value(),
                signature: own_share.to_bytes().to_vec(),
            };
            round.add_share(own_id, own_share);
            inner.state = BeaconState::CollectSignatures;
            Envelope::SignatureShare(message).encode()?
        };
        self.endpoint.broadcast(&payload)?;
        Ok(Progress::Ready(BeaconState::CollectSignatures))
    }

    fn on_collect_signatures(&self) -> Result<Progress<BeaconState>> {
        let drained = self.sig_inbox.drain();

        // Short lock: pair each inbound share with the key share needed
        // to check it.
        let (round_number, seed, candidates) = {
            let mut inner = self.inner.lock();
            let active = active_mut(&mut inner)?;
            let round = active
                .round
                .as_ref()
                .ok_or_else(|| BeaconError::invariant("no open round"))?;
            let round_number = round.round();
            let seed = round.seed().to_vec();

            let manager = active.unit.manager();
            let mut candidates: Vec<(ParticipantId, SignatureShare, PublicKey)> = Vec::new();
            for message in drained {
                if message.round != round_number {
                    continue;
                }
                let Ok(id) = ParticipantId::new(message.participant_id) else {
                    warn!("signature share with zero index");
                    continue;
                };
                let Some(key) = manager.public_key_share(id) else {
                    warn!(id = %id, "signature share from unknown member");
                    continue;
                };
                candidates.push((id, message, key));
            }
            (round_number, seed, candidates)
        };

        // Decoding and pairing checks with no lock held.
        let mut verified: Vec<(ParticipantId, Signature)> = Vec::new();
        for (id, message, key) in candidates {
            let Ok(signature) = message.decode() else {
                warn!(id = %id, "malformed partial signature");
                continue;
            };
            if verify_signature(&key, &seed, &signature) {
                verified.push((id, signature));
            } else {
                warn!(id = %id, round = round_number, "partial signature failed pairing check");
            }
        }

        // Back under the lock: absorb the verified shares and, at
        // quorum, interpolate the group signature.
        let (signature, group_key) = {
            let mut inner = self.inner.lock();
            let active = active_mut(&mut inner)?;
            let round = active
                .round
                .as_mut()
                .ok_or_else(|| BeaconError::invariant("no open round"))?;
            for (id, signature) in verified {
                round.add_share(id, signature);
            }
            if round.num_shares() < round.threshold() {
                return Ok(Progress::Pending);
            }
            round.recover_signature()?;
            let signature = *round
                .signature()
                .ok_or_else(|| BeaconError::invariant("recovery left no signature"))?;
            let group_key = active
                .unit
                .manager()
                .group_public_key()
                .copied()
                .ok_or_else(|| BeaconError::invariant("active cabinet without a group key"))?;
            (signature, group_key)
        };

        // Final pairing check outside the lock as well.
        if !verify_signature(&group_key, &seed, &signature) {
            // Every aggregated share passed its pairing check, so a bad
            // group signature means local state is corrupt.
            return Err(BeaconError::invariant(
                "recovered group signature failed verification",
            ));
        }

        let mut inner = self.inner.lock();
        inner.state = BeaconState::Complete;
        Ok(Progress::Ready(BeaconState::Complete))
    }

    fn on_complete(&self) -> Result<Progress<BeaconState>> {
        let (entropy, payload) = {
            let mut inner = self.inner.lock();
            let (entropy, record) = {
                let active = active_mut(&mut inner)?;
                let round = active
                    .round
                    .as_ref()
                    .ok_or_else(|| BeaconError::invariant("no open round"))?;
                let entropy = round.entropy()?;
                let signature = round
                    .signature()
                    .ok_or_else(|| BeaconError::invariant("complete without signature"))?;
                let record = EntropyRecord {
                    round: round.round(),
                    seed: round.seed().to_vec(),
                    signature: signature.to_bytes().to_vec(),
                    entropy: entropy.value().to_vec(),
                };

                active.next_seed = entropy.value().to_vec();
                active.next_round += 1;
                active.round = None;
                active.own_share = None;
                (entropy, record)
            };

            inner.history.insert(entropy.round(), entropy);
            prune_history(&mut inner.history);
            inner.state = BeaconState::CommitteeRotation;
            (entropy, Envelope::Entropy(record).encode()?)
        };

        info!(
            round = entropy.round(),
            entropy = %hex::encode(&entropy.value()[..8]),
            "round complete"
        );
        self.endpoint.broadcast(&payload)?;
        Ok(Progress::Ready(BeaconState::CommitteeRotation))
    }

    fn on_rotation(&self) -> Result<Progress<BeaconState>> {
        let mut inner = self.inner.lock();
        let active = active_mut(&mut inner)?;
        if active.unit.cabinet().covers_round(active.next_round) {
            inner.state = BeaconState::PrepareEntropyGeneration;
            return Ok(Progress::Ready(BeaconState::PrepareEntropyGeneration));
        }

        info!(
            generation = active.unit.generation(),
            "cabinet round window exhausted"
        );
        inner.active = None;
        inner.buffered.clear();
        self.sig_inbox.clear();
        inner.state = BeaconState::WaitForSetupCompletion;
        Ok(Progress::Ready(BeaconState::WaitForSetupCompletion))
    }
}

fn active_mut(inner: &mut SchedInner) -> Result<&mut ActiveCabinet> {
    let state = inner.state;
    inner
        .active
        .as_mut()
        .ok_or_else(|| BeaconError::invariant(format!("{state} without an active cabinet")))
}

fn prune_history(history: &mut BTreeMap<u64, Entropy>) {
    while history.len() > HISTORY_LENGTH {
        let Some((&oldest, _)) = history.iter().next() else {
            break;
        };
        history.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeon_core::SetupTimetable;
    use aeon_transport::MemoryHub;
    use rand::rngs::OsRng;

    fn scheduler_on_fresh_hub() -> Arc<CabinetRotationScheduler> {
        let hub = MemoryHub::new();
        let endpoint = Arc::new(hub.endpoint(Identity::random(&mut OsRng)));
        let coordinator = Arc::new(CabinetSetupCoordinator::new(
            endpoint.clone() as Arc<dyn Endpoint>,
            SetupTimetable::default(),
        ));
        CabinetRotationScheduler::new(endpoint, coordinator)
    }

    fn stub_unit(scheduler: &CabinetRotationScheduler, generation: u64) -> AeonExecutionUnit {
        let mut members: BTreeSet<Identity> =
            (0..2).map(|_| Identity::random(&mut OsRng)).collect();
        members.insert(scheduler.identity);
        let cabinet = Cabinet::new(members, 2, 0, 5).unwrap();
        let manager = ThresholdKeyManager::new(scheduler.identity, 3, 2, &mut OsRng).unwrap();
        AeonExecutionUnit::new(manager, cabinet, generation)
    }

    #[test]
    fn activation_follows_generation_order_not_completion_order() {
        // Generations complete 2, 0, 1; activation must deliver 0, 1, 2.
        let scheduler = scheduler_on_fresh_hub();
        for generation in [2u64, 0, 1] {
            scheduler.on_setup_complete(stub_unit(&scheduler, generation));
        }
        {
            let mut inner = scheduler.inner.lock();
            inner.next_generation = 3;
        }

        assert!(scheduler.switch_cabinet());
        assert_eq!(scheduler.active_generation(), Some(0));
        assert!(scheduler.switch_cabinet());
        assert_eq!(scheduler.active_generation(), Some(1));
        assert!(scheduler.switch_cabinet());
        assert_eq!(scheduler.active_generation(), Some(2));
        assert!(!scheduler.switch_cabinet());
    }

    #[test]
    fn out_of_order_completion_stays_parked() {
        let scheduler = scheduler_on_fresh_hub();
        scheduler.on_setup_complete(stub_unit(&scheduler, 1));
        assert!(!scheduler.switch_cabinet());
        assert_eq!(scheduler.active_generation(), None);

        scheduler.on_setup_complete(stub_unit(&scheduler, 0));
        assert!(scheduler.switch_cabinet());
        assert_eq!(scheduler.active_generation(), Some(0));
    }

    #[test]
    fn skip_round_consumes_a_generation() {
        let scheduler = scheduler_on_fresh_hub();
        let mut members: BTreeSet<Identity> =
            (0..2).map(|_| Identity::random(&mut OsRng)).collect();
        members.insert(scheduler.identity);

        let first = scheduler
            .start_new_cabinet(members.clone(), 2, 0, 5, &mut OsRng)
            .unwrap();
        assert_eq!(first, 0);
        let skipped = scheduler.skip_round();
        assert_eq!(skipped, 1);
        let next = scheduler
            .start_new_cabinet(members, 2, 5, 10, &mut OsRng)
            .unwrap();
        assert_eq!(next, 2);
    }

    #[test]
    fn switch_cabinet_passes_over_skipped_generations() {
        let scheduler = scheduler_on_fresh_hub();
        {
            let mut inner = scheduler.inner.lock();
            inner.next_generation = 2;
            inner.skipped.insert(0);
        }
        scheduler.on_setup_complete(stub_unit(&scheduler, 1));
        assert!(scheduler.switch_cabinet());
        assert_eq!(scheduler.active_generation(), Some(1));
    }

    #[test]
    fn rejects_cabinet_without_local_node() {
        let scheduler = scheduler_on_fresh_hub();
        let members: BTreeSet<Identity> =
            (0..3).map(|_| Identity::random(&mut OsRng)).collect();
        assert!(scheduler
            .start_new_cabinet(members, 2, 0, 5, &mut OsRng)
            .is_err());
    }

    #[test]
    fn signature_shares_are_gated_by_round() {
        let scheduler = scheduler_on_fresh_hub();
        let message = SignatureShare {
            round: 0,
            participant_id: 1,
            signature: vec![0u8; 48],
        };
        // No active cabinet: rejected outright.
        assert!(!scheduler.submit_signature_share(message.clone()));

        scheduler.on_setup_complete(stub_unit(&scheduler, 0));
        {
            let mut inner = scheduler.inner.lock();
            inner.next_generation = 1;
        }
        assert!(scheduler.switch_cabinet());

        // Current round is accepted into the inbox.
        assert!(scheduler.submit_signature_share(message.clone()));
        // Near-future rounds are buffered, far-future rejected.
        assert!(scheduler.submit_signature_share(SignatureShare {
            round: 2,
            ..message.clone()
        }));
        assert!(!scheduler.submit_signature_share(SignatureShare {
            round: READ_AHEAD,
            ..message
        }));
    }
}
