//! Property-based tests for the chain
//!
//! Steps are modelled as tagged integers so the invariants can be checked
//! independently of step execution.

use super::Chain;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Next,
    PushNext { id: u32, temporary: bool },
    Push(u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Next),
        (any::<u32>(), any::<bool>()).prop_map(|(id, temporary)| Op::PushNext { id, temporary }),
        any::<u32>().prop_map(Op::Push),
    ]
}

/// Replay `ops` against a plain model of the permanent steps
fn permanent_model(initial: &[u32], ops: &[Op]) -> Vec<u32> {
    let mut entries: Vec<(u32, bool)> = initial.iter().map(|id| (*id, false)).collect();
    let mut cursor = 0usize;
    for op in ops {
        match op {
            Op::Next => {
                if cursor < entries.len() {
                    cursor += 1;
                }
            }
            Op::PushNext { id, temporary } => entries.insert(cursor, (*id, *temporary)),
            Op::Push(id) => entries.push((*id, false)),
        }
    }
    entries
        .into_iter()
        .filter(|(_, temporary)| !temporary)
        .map(|(id, _)| id)
        .collect()
}

fn drain(chain: &mut Chain<u32>) -> Vec<u32> {
    std::iter::from_fn(|| chain.next()).collect()
}

proptest! {
    #[test]
    fn reset_keeps_exactly_permanent_steps(
        initial in prop::collection::vec(any::<u32>(), 0..8),
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut chain = Chain::new(initial.clone());
        for op in &ops {
            match op {
                Op::Next => { chain.next(); }
                Op::PushNext { id, temporary } => { chain.push_next(*id, *temporary); }
                Op::Push(id) => { chain.push([*id]); }
            }
        }

        chain.reset();
        let expected = permanent_model(&initial, &ops);
        prop_assert_eq!(chain.cursor(), 0);
        prop_assert_eq!(drain(&mut chain), expected.clone());

        // Replays identically after a second reset
        chain.reset();
        prop_assert_eq!(drain(&mut chain), expected);
    }

    #[test]
    fn cursor_is_monotonic(
        steps in prop::collection::vec(any::<u32>(), 0..20),
        extra in 0usize..10,
    ) {
        let mut chain = Chain::new(steps.clone());
        let mut previous = chain.cursor();
        let mut returned = 0;

        for _ in 0..steps.len() + extra {
            if chain.next().is_some() {
                returned += 1;
            }
            prop_assert!(chain.cursor() >= previous);
            prop_assert!(chain.cursor() <= chain.len());
            previous = chain.cursor();
        }

        prop_assert_eq!(returned, steps.len());
        prop_assert_eq!(chain.next(), None);
    }
}
