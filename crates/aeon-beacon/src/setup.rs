//! Cabinet setup state machine.
//!
//! Runs the key-generation handshake for queued cabinets, one at a time:
//!
//! ```text
//! IDLE -> BROADCAST_ID -> WAIT_FOR_IDS -> CREATE_SHARES -> SEND_SHARES
//!      -> WAIT_FOR_SHARES -> GENERATE_KEYS -> BEACON_READY -> IDLE
//! ```
//!
//! The coordinator is poll-driven: network handlers push into bounded
//! inboxes and `step` drains them. Waiting states report `Pending` until
//! their input arrives or their deadline passes; a passed deadline aborts
//! the cabinet in progress and surfaces as
//! [`BeaconError::Stalled`](aeon_core::BeaconError).
//!
//! Locking discipline: `step` runs on one driver context while the
//! `submit_*` entry points run on transport threads, so every critical
//! section here is short. Outbound payloads are staged under the lock and
//! sent after it is released, and key assembly takes the in-progress
//! cabinet out of the shared state entirely while the pairing work runs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, info, warn};

use aeon_core::{
    BeaconError, BoundedQueue, Identity, ParticipantId, Progress, Result, SetupTimetable,
};
use aeon_crypto::{verify_share, PublicKey, ThresholdKeyManager};
use aeon_transport::Endpoint;

use crate::aeon::AeonExecutionUnit;
use crate::messages::{CabinetMemberDetails, Envelope, ShareSubmission};

/// Inbox capacity; sized for a cabinet's worth of traffic with headroom
/// for resends.
const INBOX_CAPACITY: usize = 256;

/// How many generations ahead of the current setup announcements are
/// buffered. Announcements are one-shot, so a member already setting up
/// generation g+1 must not lose them while we finish g.
const DETAILS_AHEAD: u64 = 4;

/// Buffered announcements kept per future generation.
const DETAILS_PER_GENERATION: usize = 64;

/// States of the setup machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    /// No cabinet in progress; waiting for the queue.
    Idle,
    /// Announce our participant index to the cabinet.
    BroadcastId,
    /// Collect every member's announced index.
    WaitForIds,
    /// Deal our polynomial and its verification vector.
    CreateShares,
    /// Deliver one share to each counterparty, with retries.
    SendShares,
    /// Collect a share from every dealer.
    WaitForShares,
    /// Assemble the threshold key material.
    GenerateKeys,
    /// Hand the finished unit to the ready callback.
    BeaconReady,
}

impl SetupState {
    /// Stable uppercase name used in logs and stall reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::BroadcastId => "BROADCAST_ID",
            Self::WaitForIds => "WAIT_FOR_IDS",
            Self::CreateShares => "CREATE_SHARES",
            Self::SendShares => "SEND_SHARES",
            Self::WaitForShares => "WAIT_FOR_SHARES",
            Self::GenerateKeys => "GENERATE_KEYS",
            Self::BeaconReady => "BEACON_READY",
        }
    }
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of the coordinator for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupStatus {
    /// Current state.
    pub state: SetupState,
    /// Cabinets waiting behind the current one.
    pub queued: usize,
    /// Member announcements collected so far.
    pub collected_ids: usize,
    /// Shares collected so far.
    pub collected_shares: usize,
}

/// Scratch state for the cabinet currently being set up.
struct SetupInProgress {
    unit: AeonExecutionUnit,
    details: BTreeMap<Identity, ParticipantId>,
    claimed_indices: BTreeSet<u64>,
    delivered: BTreeMap<Identity, bool>,
    pending_shares: BTreeMap<Identity, ShareSubmission>,
    entered_at: Instant,
    shares_started: Option<Instant>,
    last_send: Option<Instant>,
}

impl SetupInProgress {
    fn new(unit: AeonExecutionUnit) -> Self {
        Self {
            unit,
            details: BTreeMap::new(),
            claimed_indices: BTreeSet::new(),
            delivered: BTreeMap::new(),
            pending_shares: BTreeMap::new(),
            entered_at: Instant::now(),
            shares_started: None,
            last_send: None,
        }
    }
}

struct Inner {
    state: SetupState,
    queued: VecDeque<AeonExecutionUnit>,
    current: Option<SetupInProgress>,
    future_details: BTreeMap<u64, Vec<CabinetMemberDetails>>,
}

type ReadyCallback = Box<dyn Fn(AeonExecutionUnit) + Send + Sync>;

/// Long-lived driver of cabinet setups.
pub struct CabinetSetupCoordinator {
    endpoint: Arc<dyn Endpoint>,
    timetable: SetupTimetable,
    member_inbox: BoundedQueue<CabinetMemberDetails>,
    share_inbox: BoundedQueue<ShareSubmission>,
    inner: Mutex<Inner>,
    callback: Mutex<Option<ReadyCallback>>,
}

impl CabinetSetupCoordinator {
    /// Create a coordinator speaking through `endpoint`.
    pub fn new(endpoint: Arc<dyn Endpoint>, timetable: SetupTimetable) -> Self {
        Self {
            endpoint,
            timetable,
            member_inbox: BoundedQueue::new(INBOX_CAPACITY),
            share_inbox: BoundedQueue::new(INBOX_CAPACITY),
            inner: Mutex::new(Inner {
                state: SetupState::Idle,
                queued: VecDeque::new(),
                current: None,
                future_details: BTreeMap::new(),
            }),
            callback: Mutex::new(None),
        }
    }

    /// Append a cabinet to the setup queue. Setups run strictly in
    /// queue order, one at a time.
    pub fn queue_setup(&self, unit: AeonExecutionUnit) {
        let mut inner = self.inner.lock();
        info!(generation = unit.generation(), "queued cabinet setup");
        inner.queued.push_back(unit);
    }

    /// Install the callback invoked with each finished unit. Replaces
    /// any previous callback.
    pub fn set_beacon_ready_callback(&self, callback: impl Fn(AeonExecutionUnit) + Send + Sync + 'static) {
        *self.callback.lock() = Some(Box::new(callback));
    }

    /// Current state.
    pub fn state(&self) -> SetupState {
        self.inner.lock().state
    }

    /// Snapshot for logs and tests.
    pub fn status(&self) -> SetupStatus {
        let inner = self.inner.lock();
        SetupStatus {
            state: inner.state,
            queued: inner.queued.len(),
            collected_ids: inner.current.as_ref().map_or(0, |c| c.details.len()),
            collected_shares: inner
                .current
                .as_ref()
                .map_or(0, |c| c.pending_shares.len()),
        }
    }

    /// Accept a member's index announcement into the inbox. Returns
    /// whether it was accepted.
    pub fn submit_member_details(&self, details: CabinetMemberDetails) -> bool {
        self.member_inbox.push(details)
    }

    /// Accept a dealer's share for this node. Returns whether it was
    /// accepted; a rejected submission leaves the sender free to retry.
    ///
    /// The share is verified against the dealer's verification vector at
    /// this node's index before it is queued, outside any lock, so a
    /// submission that reaches `GENERATE_KEYS` has already passed.
    pub fn submit_share(&self, submission: ShareSubmission) -> bool {
        match self.vet_share(&submission) {
            Ok(()) => self.share_inbox.push(submission),
            Err(error @ BeaconError::ProtocolViolation { .. })
            | Err(error @ BeaconError::MalformedInput { .. }) => {
                warn!(from = %submission.from, error = %error, "rejected share");
                false
            }
            Err(error) => {
                debug!(from = %submission.from, error = %error, "rejected share");
                false
            }
        }
    }

    /// Classify a share submission against the setup in progress. The
    /// lock is only held to copy out the vetting context; the pairing
    /// arithmetic runs without it.
    fn vet_share(&self, submission: &ShareSubmission) -> Result<()> {
        let (share, vector) = submission.decode()?;

        let context = {
            let inner = self.inner.lock();
            inner.current.as_ref().map(|current| {
                (
                    current.unit.generation(),
                    current.unit.cabinet().contains(&submission.from),
                    current.unit.manager().participant_id(),
                    current.unit.manager().threshold() as usize,
                )
            })
        };
        let Some((generation, is_member, own_id, threshold)) = context else {
            return Err(BeaconError::not_ready("no cabinet setup in progress"));
        };
        if submission.generation != generation {
            // Shares are retried by the sender until our setup catches
            // up, so a mismatch is simply rejected.
            return Err(BeaconError::not_ready(format!(
                "share for generation {}, setting up {generation}",
                submission.generation
            )));
        }
        if !is_member {
            return Err(BeaconError::protocol_violation(
                "share from a non-member of the cabinet",
            ));
        }
        if vector.len() != threshold {
            return Err(BeaconError::protocol_violation(format!(
                "verification vector has {} commitments, expected {threshold}",
                vector.len()
            )));
        }
        if !verify_share(&share, own_id, &vector) {
            return Err(BeaconError::protocol_violation(
                "share does not match its verification vector",
            ));
        }
        Ok(())
    }

    /// Poll the machine once.
    ///
    /// Returns `Ready(state)` when a transition happened, `Pending` when
    /// the machine is parked, and an error when the current setup was
    /// aborted. After an error the machine is back in `IDLE` and the
    /// next queued cabinet can proceed.
    pub fn step<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Progress<SetupState>> {
        let state = self.inner.lock().state;
        let outcome = match state {
            SetupState::Idle => self.on_idle(),
            SetupState::BroadcastId => self.on_broadcast_id(),
            SetupState::WaitForIds => self.on_wait_for_ids(),
            SetupState::CreateShares => self.on_create_shares(rng),
            SetupState::SendShares => self.on_send_shares(),
            SetupState::WaitForShares => self.on_wait_for_shares(),
            SetupState::GenerateKeys => self.on_generate_keys(),
            SetupState::BeaconReady => match self.on_beacon_ready() {
                Ok(unit) => {
                    if let Some(callback) = self.callback.lock().as_ref() {
                        callback(unit);
                    } else {
                        warn!("beacon ready with no callback installed, unit dropped");
                    }
                    return Ok(Progress::Ready(SetupState::Idle));
                }
                Err(error) => Err(error),
            },
        };

        match outcome {
            Ok(progress) => {
                if let Progress::Ready(state) = progress {
                    debug!(state = %state, "setup transition");
                }
                Ok(progress)
            }
            Err(error) => {
                warn!(error = %error, "aborting cabinet setup");
                let mut inner = self.inner.lock();
                self.abort(&mut inner);
                Err(error)
            }
        }
    }

    fn abort(&self, inner: &mut Inner) {
        if let Some(current) = inner.current.take() {
            info!(
                generation = current.unit.generation(),
                "cabinet setup abandoned"
            );
        }
        // Announcements for later generations stay queued; only shares
        // are retried by their senders.
        self.share_inbox.clear();
        inner.state = SetupState::Idle;
    }

    fn on_idle(&self) -> Result<Progress<SetupState>> {
        let mut inner = self.inner.lock();
        let Some(unit) = inner.queued.pop_front() else {
            return Ok(Progress::Pending);
        };
        let generation = unit.generation();
        info!(
            generation,
            members = unit.cabinet().size(),
            threshold = unit.cabinet().threshold(),
            "starting cabinet setup"
        );

        // Announcements that arrived while an earlier setup was running
        // go back through the inbox for this generation.
        let stale: Vec<u64> = inner
            .future_details
            .keys()
            .copied()
            .filter(|g| *g < generation)
            .collect();
        for g in stale {
            inner.future_details.remove(&g);
        }
        if let Some(buffered) = inner.future_details.remove(&generation) {
            for details in buffered {
                if !self.member_inbox.push(details) {
                    warn!(generation, "inbox full while replaying announcements");
                    break;
                }
            }
        }

        inner.current = Some(SetupInProgress::new(unit));
        inner.state = SetupState::BroadcastId;
        Ok(Progress::Ready(SetupState::BroadcastId))
    }

    fn on_broadcast_id(&self) -> Result<Progress<SetupState>> {
        // Stage the announcement under the lock, send after releasing
        // it: the transport delivers into peers' handlers, which take
        // their own locks.
        let payload = {
            let mut inner = self.inner.lock();
            let current = current_mut(&mut inner)?;
            let identity = current.unit.manager().identity();
            let own_id = current.unit.manager().participant_id();

            // Record our own announcement locally; the broadcast only
            // has to reach the others.
            current.details.insert(identity, own_id);
            current.claimed_indices.insert(own_id.value());

            let envelope = Envelope::MemberDetails(CabinetMemberDetails {
                generation: current.unit.generation(),
                identity,
                participant_id: own_id.value(),
            });
            current.entered_at = Instant::now();
            inner.state = SetupState::WaitForIds;
            envelope.encode()?
        };
        self.endpoint.broadcast(&payload)?;
        Ok(Progress::Ready(SetupState::WaitForIds))
    }

    fn on_wait_for_ids(&self) -> Result<Progress<SetupState>> {
        let mut inner = self.inner.lock();
        let generation = current_mut(&mut inner)?.unit.generation();
        let mut future: Vec<CabinetMemberDetails> = Vec::new();

        let current = current_mut(&mut inner)?;
        for details in self.member_inbox.drain() {
            if details.generation != generation {
                if details.generation > generation {
                    future.push(details);
                } else {
                    debug!(
                        from = %details.identity,
                        generation = details.generation,
                        "announcement for a finished generation, dropping"
                    );
                }
                continue;
            }
            let Ok(id) = ParticipantId::new(details.participant_id) else {
                warn!(from = %details.identity, "announced a zero index, ignoring");
                continue;
            };
            if !current.unit.cabinet().contains(&details.identity) {
                debug!(from = %details.identity, "announcement from non-member, ignoring");
                continue;
            }
            match current.details.get(&details.identity) {
                Some(existing) if *existing == id => {}
                Some(_) => {
                    warn!(from = %details.identity, "conflicting index announcement, keeping first");
                }
                None => {
                    if current.claimed_indices.contains(&id.value()) {
                        warn!(from = %details.identity, index = id.value(), "index already claimed, ignoring");
                        continue;
                    }
                    current.details.insert(details.identity, id);
                    current.claimed_indices.insert(id.value());
                }
            }
        }

        for details in future {
            if details.generation >= generation + DETAILS_AHEAD {
                debug!(generation = details.generation, "announcement too far ahead, dropping");
                continue;
            }
            let buffer = inner.future_details.entry(details.generation).or_default();
            if buffer.len() < DETAILS_PER_GENERATION {
                buffer.push(details);
            }
        }

        let current = current_mut(&mut inner)?;
        if current.details.len() as u32 == current.unit.cabinet().size() {
            let roster: Vec<(Identity, ParticipantId)> = current
                .details
                .iter()
                .map(|(identity, id)| (*identity, *id))
                .collect();
            for (identity, id) in roster {
                current
                    .unit
                    .manager_mut()
                    .insert_member(identity, id)
                    .map_err(|e| BeaconError::invariant(format!("registering {identity}: {e}")))?;
            }
            inner.state = SetupState::CreateShares;
            return Ok(Progress::Ready(SetupState::CreateShares));
        }

        let elapsed = current.entered_at.elapsed();
        if elapsed > self.timetable.wait_for_ids {
            return Err(BeaconError::stalled(SetupState::WaitForIds.name(), elapsed));
        }
        Ok(Progress::Pending)
    }

    fn on_create_shares<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Progress<SetupState>> {
        let mut inner = self.inner.lock();
        let current = current_mut(&mut inner)?;
        current
            .unit
            .manager_mut()
            .generate_contribution(rng)
            .map_err(|e| BeaconError::invariant(format!("generating contribution: {e}")))?;

        let identity = current.unit.manager().identity();
        current.delivered = current
            .unit
            .cabinet()
            .members()
            .iter()
            .filter(|member| **member != identity)
            .map(|member| (*member, false))
            .collect();
        current.shares_started = Some(Instant::now());
        current.last_send = None;

        inner.state = SetupState::SendShares;
        Ok(Progress::Ready(SetupState::SendShares))
    }

    fn on_send_shares(&self) -> Result<Progress<SetupState>> {
        // Stage every due submission under the lock; the sends and the
        // acknowledgement bookkeeping happen after it is released, so a
        // receiver verifying the share never contends with this lock.
        let staged = {
            let mut inner = self.inner.lock();
            let current = current_mut(&mut inner)?;
            let generation = current.unit.generation();
            let identity = current.unit.manager().identity();

            // Our own share never touches the transport.
            if !current.pending_shares.contains_key(&identity) {
                let submission = build_submission(current.unit.manager(), generation, &identity)?;
                current.pending_shares.insert(identity, submission);
            }

            if current.delivered.values().all(|sent| *sent) {
                inner.state = SetupState::WaitForShares;
                return Ok(Progress::Ready(SetupState::WaitForShares));
            }

            let elapsed = shares_elapsed(current);
            if elapsed > self.timetable.wait_for_shares {
                return Err(BeaconError::stalled(SetupState::SendShares.name(), elapsed));
            }

            let due = current
                .last_send
                .map_or(true, |at| at.elapsed() >= self.timetable.resend_interval);
            if !due {
                return Ok(Progress::Pending);
            }
            current.last_send = Some(Instant::now());

            let mut staged: Vec<(Identity, Vec<u8>)> = Vec::new();
            for (member, sent) in &current.delivered {
                if *sent {
                    continue;
                }
                let submission = build_submission(current.unit.manager(), generation, member)?;
                staged.push((*member, Envelope::Share(submission).encode()?));
            }
            staged
        };

        let mut acked: Vec<Identity> = Vec::new();
        for (member, payload) in staged {
            match self.endpoint.send_to(&member, &payload) {
                Ok(delivery) if delivery.is_accepted() => acked.push(member),
                Ok(_) => {
                    debug!(to = %member, "share rejected, will resend");
                }
                Err(error) => {
                    debug!(to = %member, error = %error, "share send failed, will resend");
                }
            }
        }

        if !acked.is_empty() {
            let mut inner = self.inner.lock();
            if let Some(current) = inner.current.as_mut() {
                for member in acked {
                    current.delivered.insert(member, true);
                }
            }
        }
        // Completion is observed on the next poll once every ack is in.
        Ok(Progress::Pending)
    }

    fn on_wait_for_shares(&self) -> Result<Progress<SetupState>> {
        let mut inner = self.inner.lock();
        let current = current_mut(&mut inner)?;

        for submission in self.share_inbox.drain() {
            if submission.generation != current.unit.generation() {
                debug!(from = %submission.from, "share for another generation, dropping");
                continue;
            }
            if !current.unit.cabinet().contains(&submission.from) {
                debug!(from = %submission.from, "share from non-member, dropping");
                continue;
            }
            match current.pending_shares.get(&submission.from) {
                Some(existing) if *existing == submission => {}
                Some(_) => {
                    warn!(from = %submission.from, "conflicting share submission, keeping first");
                }
                None => {
                    current.pending_shares.insert(submission.from, submission);
                }
            }
        }

        if current.pending_shares.len() as u32 == current.unit.cabinet().size() {
            inner.state = SetupState::GenerateKeys;
            return Ok(Progress::Ready(SetupState::GenerateKeys));
        }

        let elapsed = shares_elapsed(current);
        if elapsed > self.timetable.wait_for_shares {
            return Err(BeaconError::stalled(
                SetupState::WaitForShares.name(),
                elapsed,
            ));
        }
        Ok(Progress::Pending)
    }

    fn on_generate_keys(&self) -> Result<Progress<SetupState>> {
        // Key assembly re-verifies one share per member, so the cabinet
        // leaves the shared state while that work runs. Shares arriving
        // meanwhile are rejected and resent, which no longer matters at
        // this point: every needed share is already in pending_shares.
        let mut current = {
            let mut inner = self.inner.lock();
            inner
                .current
                .take()
                .ok_or_else(|| BeaconError::invariant("GENERATE_KEYS without a cabinet"))?
        };

        let assembled = assemble_keys(&mut current);
        let mut inner = self.inner.lock();
        match assembled {
            Ok(public_key) => {
                info!(
                    generation = current.unit.generation(),
                    group_key = %hex::encode(&public_key.to_bytes()[..8]),
                    "threshold keys assembled"
                );
                inner.current = Some(current);
                inner.state = SetupState::BeaconReady;
                Ok(Progress::Ready(SetupState::BeaconReady))
            }
            Err(error) => Err(error),
        }
    }

    fn on_beacon_ready(&self) -> Result<AeonExecutionUnit> {
        // The callback runs in `step` with no lock held.
        let mut inner = self.inner.lock();
        let mut current = inner
            .current
            .take()
            .ok_or_else(|| BeaconError::invariant("BEACON_READY without a cabinet"))?;
        current.unit.mark_ready();
        self.share_inbox.clear();
        inner.state = SetupState::Idle;
        info!(generation = current.unit.generation(), "beacon ready");
        Ok(current.unit)
    }
}

fn current_mut(inner: &mut Inner) -> Result<&mut SetupInProgress> {
    let state = inner.state;
    inner
        .current
        .as_mut()
        .ok_or_else(|| BeaconError::invariant(format!("{state} without a cabinet")))
}

fn shares_elapsed(current: &SetupInProgress) -> std::time::Duration {
    current
        .shares_started
        .map_or_else(Default::default, |at| at.elapsed())
}

/// Feed every stored submission into the manager and assemble the key
/// material. Everything here was validated on receipt; any failure now
/// means local state went bad after the fact.
fn assemble_keys(current: &mut SetupInProgress) -> Result<PublicKey> {
    let submissions: Vec<(Identity, ShareSubmission)> = current
        .pending_shares
        .iter()
        .map(|(from, submission)| (*from, submission.clone()))
        .collect();

    for (from, submission) in submissions {
        let (share, vector) = submission
            .decode()
            .map_err(|e| BeaconError::invariant(format!("stored share from {from}: {e}")))?;
        current
            .unit
            .manager_mut()
            .add_share(&from, share, vector)
            .map_err(|e| BeaconError::invariant(format!("accepted share from {from}: {e}")))?;
    }
    current
        .unit
        .manager_mut()
        .create_key_pair()
        .map_err(|e| BeaconError::invariant(format!("assembling keys: {e}")))
}

fn build_submission(
    manager: &ThresholdKeyManager,
    generation: u64,
    to: &Identity,
) -> Result<ShareSubmission> {
    let share = manager
        .share_for(to)
        .map_err(|e| BeaconError::invariant(format!("share for {to}: {e}")))?;
    let vector = manager
        .verification_vector()
        .map_err(|e| BeaconError::invariant(format!("verification vector: {e}")))?;
    Ok(ShareSubmission {
        generation,
        from: manager.identity(),
        share: share.to_bytes().to_vec(),
        verification_vector: vector.to_bytes(),
    })
}
