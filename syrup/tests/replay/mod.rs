/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Recording, replaying and overriding schedules.

use pretty_assertions::assert_eq;
use syrup::Config;
use syrup::Error;
use syrup::Recorder;
use syrup::Runtime;
use syrup::types::Schedule;
use syrup::types::Tid;
use syrup::types::TraceOp;
use syrup_testutils::run_with_logs;

fn tids(raw: &[u64]) -> Vec<Tid> {
    raw.iter().copied().map(Tid::from_raw).collect()
}

/// Three threads appending their id to a shared log, yielding in between.
fn interleaved_log(rt: &Runtime) -> syrup::Result<Vec<Tid>> {
    let log = rt.shared("log", Vec::<Tid>::new());
    let handles = (0..3)
        .map(|_| {
            let log = log.clone();
            rt.create(
                move |ctx, ()| async move {
                    for _ in 0..2 {
                        log.update(|l| {
                            let mut l = l.clone();
                            l.push(ctx.tid());
                            l
                        });
                        ctx.yield_now().await;
                    }
                },
                (),
            )
        })
        .collect::<syrup::Result<Vec<_>>>()?;
    for h in &handles {
        rt.join(h)?;
    }
    Ok(log.peek())
}

fn terminated(recorder: &Recorder) -> Vec<Tid> {
    recorder
        .trace()
        .events
        .iter()
        .filter(|e| e.op == TraceOp::Terminated)
        .map(|e| e.tid)
        .collect()
}

#[test]
fn same_schedule_gives_identical_traces() {
    let schedule: Schedule = tids(&[3, 1, 1, 2, 3, 2, 1, 3, 2]).into();
    let run_once = || {
        let rt = Runtime::with_schedule(Config::default(), schedule.clone());
        let recorder = Recorder::new();
        rt.add_observer(recorder.clone());
        let value = interleaved_log(&rt).unwrap();
        (value, recorder.trace().to_json(), rt.schedule())
    };
    let (v1, json1, s1) = run_once();
    let (v2, json2, s2) = run_once();
    assert_eq!(json1, json2);
    assert_eq!(v1, v2);
    assert_eq!(v1, tids(&[3, 1, 1, 2, 3, 2]));
    assert_eq!(s1, schedule);
    assert_eq!(s1, s2);
}

#[test]
fn random_run_replays_exactly() {
    let random = Config::default().with_random_seed(0xdead_beef);
    let recorded = run_with_logs(&interleaved_log, random);

    let replay_rt = Runtime::with_schedule(Config::default(), recorded.schedule.clone());
    let recorder = Recorder::new();
    replay_rt.add_observer(recorder.clone());
    let value = interleaved_log(&replay_rt).unwrap();

    assert_eq!(value, recorded.value);
    assert_eq!(recorder.trace().to_json(), recorded.trace.to_json());
    assert_eq!(replay_rt.desyncs(), 0);
}

#[test]
fn override_then_fifo_fallback() {
    let rt = Runtime::with_schedule(Config::default(), tids(&[3, 2]).into());
    let recorder = Recorder::new();
    rt.add_observer(recorder.clone());
    let handles: Vec<_> = (0..4u32)
        .map(|i| rt.create_fn(move |()| i, ()).unwrap())
        .collect();
    for h in &handles {
        rt.join(h).unwrap();
    }
    assert_eq!(terminated(&recorder), tids(&[3, 2, 1, 4]));
    assert_eq!(rt.schedule(), Schedule::from(tids(&[3, 2, 1, 4])));
}

#[test]
fn desyncs_are_skipped_and_counted() {
    // Thread 1 has terminated by the time the second decision names it again.
    let rt = Runtime::with_schedule(Config::default(), tids(&[1, 1, 2]).into());
    let a = rt.create_fn(|()| 'a', ()).unwrap();
    let b = rt.create_fn(|()| 'b', ()).unwrap();
    assert_eq!(rt.join(&b), Ok('b'));
    assert_eq!(rt.join(&a), Ok('a'));
    assert_eq!(rt.desyncs(), 1);
    assert_eq!(rt.schedule(), Schedule::from(tids(&[1, 2])));
}

#[test]
fn die_on_desync() {
    let config = Config {
        die_on_desync: true,
        ..Config::default()
    };
    let rt = Runtime::with_schedule(config, tids(&[7]).into());
    let a = rt.create_fn(|()| (), ()).unwrap();
    assert_eq!(
        rt.join(&a),
        Err(Error::ScheduleDesync {
            index: 0,
            requested: Tid::from_raw(7),
        })
    );
}

#[test]
fn step_limit() {
    let config = Config {
        stop_after_turn: Some(3),
        ..Config::default()
    };
    let rt = Runtime::new(config);
    let spinner = rt
        .create(
            |ctx, ()| async move {
                let mut spins = 0u64;
                loop {
                    ctx.yield_now().await;
                    spins += 1;
                    if spins == u64::MAX {
                        break spins;
                    }
                }
            },
            (),
        )
        .unwrap();
    assert_eq!(rt.join(&spinner), Err(Error::StepLimitExceeded(3)));
    assert_eq!(rt.turn(), 3);
}

#[test]
fn schedule_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule.json");
    Schedule::from(tids(&[2, 1])).write_to_disk(&path).unwrap();

    let config = Config {
        replay_schedule_from: Some(path.clone()),
        ..Config::default()
    };
    let rt = Runtime::from_config(config).unwrap();
    let recorder = Recorder::new();
    rt.add_observer(recorder.clone());
    let a = rt.create_fn(|()| 1, ()).unwrap();
    let b = rt.create_fn(|()| 2, ()).unwrap();
    assert_eq!(rt.join(&a), Ok(1));
    assert_eq!(rt.join(&b), Ok(2));
    assert_eq!(terminated(&recorder), tids(&[2, 1]));
}

#[test]
fn invalid_config_is_rejected() {
    let config = Config {
        max_threads: 0,
        ..Config::default()
    };
    assert!(Runtime::from_config(config).is_err());
}
