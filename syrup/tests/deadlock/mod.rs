/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Join cycles.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use syrup::Error;
use syrup::JoinHandle;
use syrup::Recorder;
use syrup::Runtime;
use syrup::ThreadContext;
use syrup::ThreadState;
use syrup::types::Tid;
use syrup::types::TraceOp;

type Slot = Rc<RefCell<Option<JoinHandle<syrup::Result<u64>>>>>;

/// Join whatever thread ends up in `other`, then report our own id.
async fn join_other(ctx: ThreadContext, other: Slot) -> syrup::Result<u64> {
    let target = other
        .borrow()
        .clone()
        .expect("slot filled before the scheduler runs");
    ctx.join(&target).await??;
    Ok(ctx.tid().as_raw())
}

#[test]
fn mutual_join_is_detected() {
    let rt = Runtime::default();
    let rec = Recorder::new();
    rt.add_observer(rec.clone());
    let slot_for_a: Slot = Rc::default();
    let slot_for_b: Slot = Rc::default();
    let a = rt.create(join_other, slot_for_a.clone()).unwrap();
    let b = rt.create(join_other, slot_for_b.clone()).unwrap();
    *slot_for_a.borrow_mut() = Some(b.clone());
    *slot_for_b.borrow_mut() = Some(a.clone());

    // A parks on B first, so B's join closes the cycle and fails. B returns the error,
    // which wakes A, which passes it on.
    let deadlock = Error::DeadlockDetected {
        waiter: b.tid(),
        target: a.tid(),
        cycle: vec![b.tid(), a.tid(), b.tid()],
    };
    assert_eq!(rt.join(&a), Ok(Err(deadlock)));
    assert_eq!(rt.state(b.tid()), Ok(ThreadState::Terminated));

    let a_ops: Vec<TraceOp> = rec.trace().for_thread(a.tid()).map(|e| e.op).collect();
    assert!(a_ops.contains(&TraceOp::Blocked(b.tid())));
    let b_ops: Vec<TraceOp> = rec.trace().for_thread(b.tid()).map(|e| e.op).collect();
    assert!(!b_ops.iter().any(|op| matches!(op, TraceOp::Blocked(_))));
}

#[test]
fn three_way_cycle() {
    let rt = Runtime::default();
    let slots: Vec<Slot> = (0..3).map(|_| Rc::default()).collect();
    let handles: Vec<_> = slots
        .iter()
        .map(|s| rt.create(join_other, s.clone()).unwrap())
        .collect();
    for i in 0..3 {
        *slots[i].borrow_mut() = Some(handles[(i + 1) % 3].clone());
    }
    let [t1, t2, t3] = [0, 1, 2].map(|i| handles[i].tid());

    // 1 parks on 2, 2 parks on 3, then 3 joining 1 closes the loop.
    let result = rt.join(&handles[0]).unwrap();
    assert_eq!(
        result,
        Err(Error::DeadlockDetected {
            waiter: t3,
            target: t1,
            cycle: vec![t3, t1, t2, t3],
        })
    );
    assert!(rt.is_idle());
}

#[test]
fn self_join_is_detected() {
    let rt = Runtime::default();
    let slot: Slot = Rc::default();
    let h = rt.create(join_other, slot.clone()).unwrap();
    *slot.borrow_mut() = Some(h.clone());
    assert_eq!(
        rt.join(&h),
        Ok(Err(Error::DeadlockDetected {
            waiter: h.tid(),
            target: h.tid(),
            cycle: vec![h.tid(), h.tid()],
        }))
    );
}

#[test]
fn scheduler_stays_usable_after_a_deadlock() {
    let rt = Runtime::default();
    let slot: Slot = Rc::default();
    let looped = rt.create(join_other, slot.clone()).unwrap();
    *slot.borrow_mut() = Some(looped.clone());
    let bystander = rt.create_fn(|x: u64| x * 2, 21).unwrap();

    assert!(matches!(
        rt.join(&looped),
        Ok(Err(Error::DeadlockDetected { .. }))
    ));
    assert_eq!(rt.join(&bystander), Ok(42));

    let fresh = rt.create_fn(|()| Tid::HOST, ()).unwrap();
    assert_eq!(rt.join(&fresh), Ok(Tid::HOST));
}
