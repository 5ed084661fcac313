//! Node composition: transport wiring for one beacon participant.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand_core::{CryptoRng, RngCore};
use tracing::warn;

use aeon_core::{Identity, Progress, Result, SetupTimetable};
use aeon_transport::{Delivery, Endpoint};

use crate::messages::Envelope;
use crate::round::Entropy;
use crate::scheduler::{BeaconState, CabinetRotationScheduler};
use crate::setup::{CabinetSetupCoordinator, SetupState, SetupStatus};

/// One beacon participant: a setup coordinator and a rotation scheduler
/// sharing a transport endpoint, with inbound payloads routed to the
/// right inbox.
///
/// The node installs the endpoint's handler on construction; the handler
/// only decodes, checks the claimed sender, and pushes into bounded
/// queues. Driving the machines is the caller's job via
/// [`step_setup`](Self::step_setup) and [`step_beacon`](Self::step_beacon).
pub struct BeaconNode {
    identity: Identity,
    coordinator: Arc<CabinetSetupCoordinator>,
    scheduler: Arc<CabinetRotationScheduler>,
}

impl BeaconNode {
    /// Build a node on `endpoint` and subscribe its message router.
    pub fn new(endpoint: Arc<dyn Endpoint>, timetable: SetupTimetable) -> Arc<Self> {
        let identity = endpoint.local_identity();
        let coordinator = Arc::new(CabinetSetupCoordinator::new(
            Arc::clone(&endpoint),
            timetable,
        ));
        let scheduler =
            CabinetRotationScheduler::new(Arc::clone(&endpoint), Arc::clone(&coordinator));

        let node = Arc::new(Self {
            identity,
            coordinator,
            scheduler,
        });

        let router_coordinator = Arc::clone(&node.coordinator);
        let router_scheduler = Arc::clone(&node.scheduler);
        endpoint.subscribe(Arc::new(move |from, payload| {
            route(&router_coordinator, &router_scheduler, from, payload)
        }));
        node
    }

    /// This node's identity.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Queue a cabinet this node belongs to. Returns the assigned
    /// generation.
    pub fn start_new_cabinet<R: RngCore + CryptoRng>(
        &self,
        members: BTreeSet<Identity>,
        threshold: u32,
        round_start: u64,
        round_end: u64,
        rng: &mut R,
    ) -> Result<u64> {
        self.scheduler
            .start_new_cabinet(members, threshold, round_start, round_end, rng)
    }

    /// Consume a generation this node takes no part in.
    pub fn skip_round(&self) -> u64 {
        self.scheduler.skip_round()
    }

    /// Try to activate the next completed cabinet.
    pub fn switch_cabinet(&self) -> bool {
        self.scheduler.switch_cabinet()
    }

    /// Poll the setup machine once.
    pub fn step_setup<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Progress<SetupState>> {
        self.coordinator.step(rng)
    }

    /// Poll the entropy pipeline once.
    pub fn step_beacon(&self) -> Result<Progress<BeaconState>> {
        self.scheduler.step()
    }

    /// Entropy for a recent round, if still retained.
    pub fn entropy(&self, round: u64) -> Result<Entropy> {
        self.scheduler.entropy(round)
    }

    /// Setup machine snapshot.
    pub fn setup_status(&self) -> SetupStatus {
        self.coordinator.status()
    }

    /// Entropy pipeline state.
    pub fn beacon_state(&self) -> BeaconState {
        self.scheduler.state()
    }

    /// Generation of the active cabinet, if any.
    pub fn active_generation(&self) -> Option<u64> {
        self.scheduler.active_generation()
    }

    /// Generations with a finished setup awaiting activation.
    pub fn completed_generations(&self) -> Vec<u64> {
        self.scheduler.completed_generations()
    }
}

fn route(
    coordinator: &CabinetSetupCoordinator,
    scheduler: &CabinetRotationScheduler,
    from: &Identity,
    payload: &[u8],
) -> Delivery {
    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(from = %from, error = %error, "undecodable payload");
            return Delivery::Rejected;
        }
    };

    let accepted = match envelope {
        Envelope::MemberDetails(details) => {
            // The transport told us who sent this; a mismatched claim is
            // dropped before it reaches any protocol state.
            if details.identity != *from {
                warn!(from = %from, claimed = %details.identity, "sender mismatch on member details");
                false
            } else {
                coordinator.submit_member_details(details)
            }
        }
        Envelope::Share(submission) => {
            if submission.from != *from {
                warn!(from = %from, claimed = %submission.from, "sender mismatch on share");
                false
            } else {
                coordinator.submit_share(submission)
            }
        }
        Envelope::SignatureShare(share) => scheduler.submit_signature_share(share),
        Envelope::Entropy(record) => scheduler.handle_entropy_announcement(record),
    };

    if accepted {
        Delivery::Accepted
    } else {
        Delivery::Rejected
    }
}
