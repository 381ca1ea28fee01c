/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Testing utilities.

use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use pretty_assertions::assert_eq;
use syrup::Config;
use syrup::Recorder;
use syrup::Runtime;
use syrup_model::event::Trace;
use syrup_model::schedule::Schedule;
use tracing_subscriber::fmt::MakeWriter;

/// How many runs for each test when confirming determinism.
pub static TEST_REPS: u64 = 3;

/// Everything observable about one run of a program under test.
#[derive(Debug, Clone)]
pub struct DetRun<T> {
    /// What the program returned.
    pub value: T,
    /// Every lifecycle and access event.
    pub trace: Trace,
    /// The scheduling decisions taken.
    pub schedule: Schedule,
    /// The DETLOG lines logged during the run, with everything before the marker stripped.
    pub logs: Vec<String>,
}

struct BufWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Clone for BufWriter {
    fn clone(&self) -> Self {
        BufWriter {
            buf: self.buf.clone(),
        }
    }
}

impl BufWriter {
    fn new() -> BufWriter {
        BufWriter {
            buf: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn buf(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap()
    }

    fn get_strings(&self) -> Vec<String> {
        let mut b = self.buf();
        let s = String::from_utf8_lossy(&b[..]).to_string();
        b.clear();
        s.lines().map(String::from).collect()
    }
}

impl io::Write for BufWriter {
    fn write(&mut self, msg: &[u8]) -> io::Result<usize> {
        self.buf().extend_from_slice(msg);
        Ok(msg.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MakeWriter<'_> for BufWriter {
    type Writer = BufWriter;

    fn make_writer(&self) -> Self::Writer {
        self.clone()
    }
}

/// Keep only the DETLOG lines, minus the timestamp and level prefix.
fn detlog_lines(logs: Vec<String>) -> Vec<String> {
    logs.iter()
        .filter_map(|l| l.split_once("DETLOG ").map(|(_, suffix)| suffix.to_string()))
        .collect()
}

/// Run `f` once on a fresh runtime, with a recorder attached and the logs captured. Threads
/// that `f` leaves behind are run to completion.
pub fn run_with_logs<T, F>(f: &F, config: Config) -> DetRun<T>
where
    F: Fn(&Runtime) -> syrup::Result<T>,
{
    let trace_level =
        std::env::var("SYRUP_TEST_LOG").unwrap_or_else(|_| "syrup=info".to_string());
    let bufwriter = BufWriter::new();
    let collector = tracing_subscriber::fmt()
        .with_env_filter(trace_level)
        .with_ansi(false)
        .with_writer(bufwriter.clone())
        .finish();

    // Keep the collector scoped to this run, so that only its own logs are captured.
    let (value, trace, schedule) = tracing::subscriber::with_default(collector, || {
        let rt = Runtime::from_config(config).unwrap();
        let recorder = Recorder::new();
        rt.add_observer(recorder.clone());
        let value = f(&rt).unwrap();
        rt.run_until_idle().unwrap();
        (value, recorder.trace(), rt.schedule())
    });
    DetRun {
        value,
        trace,
        schedule,
        logs: detlog_lines(bufwriter.get_strings()),
    }
}

/// Runs a program multiple times and checks that every run was identical: same result,
/// same schedule, byte-identical trace JSON, and the same DETLOG lines.
pub fn det_test_fn<T, F>(f: F) -> DetRun<T>
where
    T: Debug + PartialEq,
    F: Fn(&Runtime) -> syrup::Result<T>,
{
    det_test_fn_with_config(f, Config::default())
}

/// Like `det_test_fn`, but allows passing in a non-default configuration.
pub fn det_test_fn_with_config<T, F>(f: F, config: Config) -> DetRun<T>
where
    T: Debug + PartialEq,
    F: Fn(&Runtime) -> syrup::Result<T>,
{
    let mut last: Option<DetRun<T>> = None;
    for ix in 1..=TEST_REPS {
        println!("Test Run {}:", ix);
        let run = run_with_logs(&f, config.clone());
        println!(
            "({} events, {} decisions, {} log lines captured.)",
            run.trace.events.len(),
            run.schedule.len(),
            run.logs.len()
        );
        if let Some(prior) = &last {
            check_run(prior, &run);
        }
        last = Some(run);
    }
    last.unwrap()
}

/// Checks a run against the one before it.
fn check_run<T: Debug + PartialEq>(prior: &DetRun<T>, run: &DetRun<T>) {
    assert_eq!(
        prior.value, run.value,
        "\n  Consecutive runs of test had different results"
    );
    assert_eq!(
        prior.schedule, run.schedule,
        "\n  Consecutive runs of test had different schedules"
    );
    assert_eq!(
        prior.trace.to_json(),
        run.trace.to_json(),
        "\n  Consecutive runs of test had different traces"
    );
    if prior.logs.len() != run.logs.len() {
        eprintln!(
            "Differing number of DETLOG lines! ({} vs {})",
            prior.logs.len(),
            run.logs.len()
        )
    }
    for (ix, (a, b)) in prior.logs.iter().zip(run.logs.iter()).enumerate() {
        assert_eq!(
            a, b,
            "\n  Consecutive runs of test had different DETLOG #{}",
            ix
        );
    }
    if prior.logs.len() != run.logs.len() {
        panic!("All present lines matched, but different number of DETLOG lines across two runs.");
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn strips_detlog_prefix() {
        let logs = vec![
            "2024-01-01T00:00:00Z  INFO syrup::scheduler: DETLOG [turn 1] scheduling thread 1"
                .to_string(),
            "2024-01-01T00:00:00Z DEBUG syrup::machine: polling".to_string(),
        ];
        assert_eq!(
            detlog_lines(logs),
            vec!["[turn 1] scheduling thread 1".to_string()]
        );
    }
}
