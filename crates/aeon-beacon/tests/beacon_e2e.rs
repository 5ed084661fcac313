//! End-to-end beacon runs over the in-memory hub.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::OsRng;

use aeon_core::{Identity, SetupTimetable};
use aeon_transport::MemoryHub;
use aeon_beacon::BeaconNode;

const MAX_STEPS: usize = 20_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_timetable() -> SetupTimetable {
    SetupTimetable {
        wait_for_ids: Duration::from_secs(5),
        wait_for_shares: Duration::from_secs(5),
        resend_interval: Duration::from_millis(5),
    }
}

fn spawn_nodes(hub: &MemoryHub, count: usize) -> Vec<Arc<BeaconNode>> {
    init_tracing();
    (0..count)
        .map(|_| {
            let endpoint = hub.endpoint(Identity::random(&mut OsRng));
            BeaconNode::new(Arc::new(endpoint), fast_timetable())
        })
        .collect()
}

fn member_set(nodes: &[Arc<BeaconNode>]) -> BTreeSet<Identity> {
    nodes.iter().map(|n| n.identity()).collect()
}

/// Step every node's setup machine until each has completed `generation`,
/// panicking on stalls or step budget exhaustion.
fn drive_setup(nodes: &[Arc<BeaconNode>], generation: u64) {
    for _ in 0..MAX_STEPS {
        if nodes
            .iter()
            .all(|n| n.completed_generations().contains(&generation))
        {
            return;
        }
        for node in nodes {
            node.step_setup(&mut OsRng).unwrap();
        }
    }
    panic!("setup for generation {generation} did not complete");
}

/// Step every node's entropy pipeline until each can report entropy for
/// `round`.
fn drive_round(nodes: &[Arc<BeaconNode>], round: u64) {
    for _ in 0..MAX_STEPS {
        if nodes.iter().all(|n| n.entropy(round).is_ok()) {
            return;
        }
        for node in nodes {
            node.step_beacon().unwrap();
        }
    }
    panic!("round {round} did not complete");
}

#[test]
fn four_nodes_agree_on_every_round() {
    let hub = MemoryHub::new();
    let nodes = spawn_nodes(&hub, 4);
    let members = member_set(&nodes);

    for node in &nodes {
        let generation = node
            .start_new_cabinet(members.clone(), 2, 0, 3, &mut OsRng)
            .unwrap();
        assert_eq!(generation, 0);
    }

    drive_setup(&nodes, 0);
    for node in &nodes {
        assert!(node.switch_cabinet());
        assert_eq!(node.active_generation(), Some(0));
    }

    let mut previous = None;
    for round in 0..3u64 {
        drive_round(&nodes, round);
        let value = *nodes[0].entropy(round).unwrap().value();
        for node in &nodes[1..] {
            assert_eq!(node.entropy(round).unwrap().value(), &value);
        }
        // Rounds must not repeat each other.
        assert_ne!(Some(value), previous);
        previous = Some(value);
    }
}

#[test]
fn rotation_hands_over_to_a_smaller_cabinet() {
    let hub = MemoryHub::new();
    let nodes = spawn_nodes(&hub, 4);
    let full = member_set(&nodes);
    let reduced: BTreeSet<Identity> = nodes[..3].iter().map(|n| n.identity()).collect();

    // Generation 0: everyone, rounds [0, 2). Generation 1: the first
    // three nodes, rounds [2, 4); the fourth sits it out.
    for node in &nodes {
        node.start_new_cabinet(full.clone(), 2, 0, 2, &mut OsRng)
            .unwrap();
    }
    for node in &nodes[..3] {
        let generation = node
            .start_new_cabinet(reduced.clone(), 2, 2, 4, &mut OsRng)
            .unwrap();
        assert_eq!(generation, 1);
    }
    assert_eq!(nodes[3].skip_round(), 1);

    drive_setup(&nodes, 0);
    drive_setup(&nodes[..3], 1);

    for node in &nodes {
        assert!(node.switch_cabinet());
    }
    drive_round(&nodes, 0);
    drive_round(&nodes, 1);

    // The first cabinet's window is exhausted; members of the second
    // cabinet pick it up, the outsider has nothing left to activate.
    for _ in 0..MAX_STEPS {
        if nodes.iter().all(|n| n.active_generation().is_none()) {
            break;
        }
        for node in &nodes {
            node.step_beacon().unwrap();
        }
    }
    assert!(!nodes[3].switch_cabinet());
    for node in &nodes[..3] {
        assert!(node.switch_cabinet());
        assert_eq!(node.active_generation(), Some(1));
    }

    drive_round(&nodes[..3], 2);
    drive_round(&nodes[..3], 3);

    let value = *nodes[0].entropy(3).unwrap().value();
    for node in &nodes[1..3] {
        assert_eq!(node.entropy(3).unwrap().value(), &value);
    }
}

/// Every node polled from its own thread. The in-memory hub delivers
/// synchronously, so a sender's broadcast runs the receivers' inbound
/// handlers on the sender's thread; the run only finishes if no state
/// lock is held across a send.
#[test]
fn nodes_stepped_on_separate_threads_make_progress() {
    let hub = MemoryHub::new();
    let nodes = spawn_nodes(&hub, 2);
    let members = member_set(&nodes);

    for node in &nodes {
        node.start_new_cabinet(members.clone(), 2, 0, 2, &mut OsRng)
            .unwrap();
    }

    let handles: Vec<_> = nodes
        .iter()
        .map(|node| {
            let node = Arc::clone(node);
            thread::spawn(move || {
                for _ in 0..MAX_STEPS {
                    if node.completed_generations().contains(&0) {
                        return true;
                    }
                    let _ = node.step_setup(&mut OsRng);
                }
                false
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap(), "setup stalled");
    }

    for node in &nodes {
        assert!(node.switch_cabinet());
    }

    let handles: Vec<_> = nodes
        .iter()
        .map(|node| {
            let node = Arc::clone(node);
            thread::spawn(move || {
                for _ in 0..MAX_STEPS {
                    if node.entropy(1).is_ok() {
                        return true;
                    }
                    let _ = node.step_beacon();
                }
                false
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap(), "rounds stalled");
    }

    let value = *nodes[0].entropy(1).unwrap().value();
    assert_eq!(nodes[1].entropy(1).unwrap().value(), &value);
}

#[test]
fn setups_run_strictly_in_queue_order() {
    let hub = MemoryHub::new();
    let nodes = spawn_nodes(&hub, 3);
    let members = member_set(&nodes);

    for node in &nodes {
        node.start_new_cabinet(members.clone(), 2, 0, 2, &mut OsRng)
            .unwrap();
        node.start_new_cabinet(members.clone(), 2, 2, 4, &mut OsRng)
            .unwrap();
    }
    drive_setup(&nodes, 0);
    drive_setup(&nodes, 1);

    for node in &nodes {
        assert_eq!(node.completed_generations(), vec![0, 1]);
        assert!(node.switch_cabinet());
        assert_eq!(node.active_generation(), Some(0));
    }
}
