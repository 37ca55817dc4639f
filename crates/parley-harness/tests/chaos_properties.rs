//! Randomized network chaos against the simulated relay.
//!
//! Participants chat, type, drop off the network, and come back while time
//! jumps forward. Once every partition heals and the retry cycle has had
//! time to run, every settled participant must agree with the relay.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use parley_client::{ClientEvent, ConnectionState};
use parley_harness::{InvariantRegistry, SimRelay, SimWorld};
use proptest::prelude::*;

const PARTICIPANTS: [&str; 3] = ["alice", "bob", "carol"];

#[derive(Debug, Clone)]
enum Op {
    Send(usize, String),
    Typing(usize),
    Partition(usize),
    Heal(usize),
    Advance(u64),
    Settle,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..PARTICIPANTS.len();
    prop_oneof![
        4 => (who.clone(), "[a-z]{1,12}").prop_map(|(id, text)| Op::Send(id, text)),
        2 => who.clone().prop_map(Op::Typing),
        1 => who.clone().prop_map(Op::Partition),
        2 => who.prop_map(Op::Heal),
        2 => (100u64..4_000).prop_map(Op::Advance),
        1 => Just(Op::Settle),
    ]
}

fn run(seed: u64, ops: &[Op]) -> SimWorld {
    let mut world = SimWorld::with_relay("chaos", SimRelay::new(), seed)
        .unwrap()
        .with_invariants(InvariantRegistry::standard());
    for name in PARTICIPANTS {
        let id = world.add_client(name).unwrap();
        world.join(id).unwrap();
    }

    for op in ops {
        match op {
            // Rejections (not connected, too long) are part of the scenario.
            Op::Send(id, text) => {
                let _ = world.handle(*id, ClientEvent::SendMessage(text.clone()));
            },
            Op::Typing(id) => {
                let _ = world.handle(*id, ClientEvent::Typing);
            },
            Op::Partition(id) => world.partition(*id),
            Op::Heal(id) => world.heal(*id),
            Op::Advance(ms) => world.advance(Duration::from_millis(*ms)),
            Op::Settle => {
                world.settle();
            },
        }
    }

    for id in 0..world.len() {
        world.heal(id);
    }
    world.advance_by_steps(Duration::from_secs(30), Duration::from_millis(500));
    world
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn settled_participants_converge(seed in any::<u64>(), ops in prop::collection::vec(op_strategy(), 0..40)) {
        let world = run(seed, &ops);
        let snapshot = world.snapshot();
        let registry = InvariantRegistry::quiescent();
        prop_assert!(registry.check_all(&snapshot).is_ok(), "{:?}", registry.check_all(&snapshot).err());
    }

    #[test]
    fn healed_participants_reconnect(seed in any::<u64>(), ops in prop::collection::vec(op_strategy(), 0..20)) {
        let world = run(seed, &ops);
        for id in 0..world.len() {
            let client = world.client(id);
            // A retry budget spent during a long partition ends in Failed.
            prop_assert!(
                matches!(client.state(), ConnectionState::Connected | ConnectionState::Failed),
                "{} stuck in {:?}", PARTICIPANTS[id], client.state()
            );
        }
    }

    #[test]
    fn replays_are_deterministic(seed in any::<u64>(), ops in prop::collection::vec(op_strategy(), 0..25)) {
        let first = run(seed, &ops).snapshot();
        let second = run(seed, &ops).snapshot();
        let ids = |s: &parley_harness::SystemSnapshot| -> Vec<_> {
            s.clients.iter().map(|c| (c.name.clone(), c.message_ids.clone(), c.state)).collect()
        };
        prop_assert_eq!(ids(&first), ids(&second));
    }
}
