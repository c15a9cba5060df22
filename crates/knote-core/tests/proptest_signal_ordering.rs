#![forbid(unsafe_code)]

//! Property tests for [`Signal`] delivery.
//!
//! Validates:
//! - `emit` reaches exactly the handlers whose guard is alive.
//! - Handlers run in registration order.
//! - Dropped guards never run again, even before the entry is pruned.

use std::cell::RefCell;
use std::rc::Rc;

use knote_core::{Signal, Subscription};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Subscribe,
    /// Drop the n-th live subscription.
    Unsubscribe(usize),
    Emit(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Subscribe),
        2 => any::<usize>().prop_map(Op::Unsubscribe),
        3 => any::<u8>().prop_map(Op::Emit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn emit_reaches_live_handlers_in_order(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let signal: Signal<u8> = Signal::new();
        let calls: Rc<RefCell<Vec<(usize, u8)>>> = Rc::new(RefCell::new(Vec::new()));
        let mut live: Vec<(usize, Subscription)> = Vec::new();
        let mut next_id = 0;

        for op in &ops {
            match op {
                Op::Subscribe => {
                    let sink = Rc::clone(&calls);
                    let id = next_id;
                    next_id += 1;
                    live.push((id, signal.subscribe(move |v: &u8| sink.borrow_mut().push((id, *v)))));
                }
                Op::Unsubscribe(n) => {
                    if !live.is_empty() {
                        let i = n % live.len();
                        live.remove(i);
                    }
                }
                Op::Emit(v) => {
                    calls.borrow_mut().clear();
                    let delivered = signal.emit(v);
                    prop_assert_eq!(delivered, live.len());
                    let expected: Vec<(usize, u8)> = live.iter().map(|(id, _)| (*id, *v)).collect();
                    prop_assert_eq!(calls.borrow().clone(), expected);
                    prop_assert_eq!(signal.subscriber_count(), live.len());
                }
            }
            prop_assert_eq!(signal.is_empty(), live.is_empty());
        }
    }
}
