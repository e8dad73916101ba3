//! End-to-end behavior of the four scheduling policies
//!
//! Every scenario runs a full simulation with scripted draws and inspects
//! the captured event log.

use std::collections::HashMap;

use faultsched::events::{EventKind, MemorySink, PreemptReason};
use faultsched::{Pid, PolicyKind, Priority, Report, ScriptedSampler, SimConfig, Simulation};

const EPS: f64 = 1e-9;

fn config(policy: PolicyKind, horizon: f64) -> SimConfig {
    SimConfig {
        policy,
        sim_duration: horizon,
        ..SimConfig::default()
    }
}

fn run(config: SimConfig, sampler: ScriptedSampler) -> (Report, MemorySink) {
    let sink = MemorySink::new();
    let report = Simulation::new(config)
        .unwrap()
        .with_sampler(sampler)
        .with_sink(sink.clone())
        .run()
        .unwrap();
    (report, sink)
}

fn prio(level: u8) -> Priority {
    Priority::new(level).unwrap()
}

/// (pid, arrival time, first grant time, wait reported at first grant)
fn waits(sink: &MemorySink) -> Vec<(Pid, f64, f64, f64)> {
    let mut arrivals = HashMap::new();
    let mut out = Vec::new();
    for event in sink.events() {
        match event.kind {
            EventKind::Arrival { pid, .. } => {
                arrivals.insert(pid, event.time);
            }
            EventKind::Execute { pid, waited } => {
                out.push((pid, arrivals[&pid], event.time, waited));
            }
            _ => {}
        }
    }
    out
}

#[test]
fn test_fcfs_wait_is_start_minus_arrival() {
    let sampler = ScriptedSampler::new()
        .arrivals([1.0, 0.5, 0.5])
        .demands([2.0, 1.0, 1.0]);
    let (report, sink) = run(config(PolicyKind::Fcfs, 50.0), sampler);

    let waits = waits(&sink);
    assert_eq!(waits.len(), 3);
    for (pid, arrival, start, waited) in &waits {
        assert!((start - arrival - waited).abs() < EPS, "process {}", pid);
        assert!(*waited >= 0.0);
    }
    let order: Vec<_> = waits.iter().map(|w| w.0).collect();
    assert_eq!(order, vec![Pid(1), Pid(2), Pid(3)]);
    assert!((waits[1].3 - 1.5).abs() < EPS);
    assert!((waits[2].3 - 2.0).abs() < EPS);

    assert_eq!(report.processes_completed, 3);
    assert!((report.average_wait.unwrap() - 3.5 / 3.0).abs() < EPS);
    assert_eq!(report.availability, 100.0);
}

#[test]
fn test_sjf_prefers_short_jobs_among_waiting() {
    let sampler = ScriptedSampler::new()
        .arrivals([1.0, 0.1, 0.1, 0.1])
        .demands([2.0, 1.5, 0.5, 0.5]);
    let (report, sink) = run(config(PolicyKind::Sjf, 50.0), sampler);

    let order: Vec<_> = waits(&sink).iter().map(|w| w.0).collect();
    // Equal demands keep arrival order
    assert_eq!(order, vec![Pid(1), Pid(3), Pid(4), Pid(2)]);
    assert_eq!(report.processes_completed, 4);
}

#[test]
fn test_round_robin_slices() {
    let quantum = 0.3;
    let demand = 1.0;
    let sampler = ScriptedSampler::new().arrivals([1.0]).demands([demand]);
    let mut cfg = config(PolicyKind::RoundRobin, 20.0);
    cfg.rr_quantum = quantum;
    let (report, sink) = run(cfg, sampler);

    let mut slices = Vec::new();
    let mut started = None;
    let mut remaining = Vec::new();
    for event in sink.events() {
        match event.kind {
            EventKind::Execute { .. } | EventKind::Resume { .. } => started = Some(event.time),
            EventKind::Preempt { remaining: rem, reason, .. } => {
                assert_eq!(reason, PreemptReason::Quantum);
                slices.push(event.time - started.take().unwrap());
                remaining.push(rem);
            }
            EventKind::Complete { .. } => slices.push(event.time - started.take().unwrap()),
            _ => {}
        }
    }

    assert_eq!(slices.len(), (demand / quantum).ceil() as usize);
    assert!(slices.iter().all(|s| *s <= quantum + EPS));
    assert!((slices.iter().sum::<f64>() - demand).abs() < 1e-6);
    assert!(remaining.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(report.processes_completed, 1);
    assert_eq!(report.processes_started, 1);
    assert_eq!(report.preemptions, 3);
}

#[test]
fn test_round_robin_wait_counts_first_grant_only() {
    let sampler = ScriptedSampler::new()
        .arrivals([1.0, 0.0])
        .demands([1.0, 1.0]);
    let mut cfg = config(PolicyKind::RoundRobin, 20.0);
    cfg.rr_quantum = 0.5;
    let (report, sink) = run(cfg, sampler);

    let waits = waits(&sink);
    assert_eq!(waits.len(), 2);
    for (_, arrival, start, waited) in &waits {
        assert!((start - arrival - waited).abs() < EPS);
    }
    // The second process gets its first slice right after the first one's
    assert!((waits[1].2 - waits[0].2 - 0.5).abs() < EPS);
    assert_eq!(report.processes_completed, 2);
    assert_eq!(report.processes_started, 2);
}

#[test]
fn test_preemptive_priority_evicts_lower_priority() {
    let sampler = ScriptedSampler::new()
        .arrivals([1.0, 1.0])
        .demands([3.0, 0.5])
        .priorities([prio(3), prio(1)]);
    let (report, sink) = run(config(PolicyKind::PreemptivePriority, 20.0), sampler);

    let timeline: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|event| !matches!(event.kind, EventKind::Arrival { .. }))
        .map(|event| (event.time, event.kind))
        .collect();
    assert_eq!(
        timeline,
        vec![
            (1.0, EventKind::Execute { pid: Pid(1), waited: 0.0 }),
            (2.0, EventKind::Execute { pid: Pid(2), waited: 0.0 }),
            (
                2.0,
                EventKind::Preempt {
                    pid: Pid(1),
                    remaining: 2.0,
                    reason: PreemptReason::Priority,
                }
            ),
            (2.5, EventKind::Complete { pid: Pid(2) }),
            (2.5, EventKind::Resume { pid: Pid(1) }),
            (4.5, EventKind::Complete { pid: Pid(1) }),
        ]
    );
    assert_eq!(report.preemptions, 1);
    assert_eq!(report.processes_completed, 2);
    assert_eq!(report.average_wait, Some(0.0));
}

#[test]
fn test_preemptive_priority_low_priority_waits_behind_urgent_work() {
    let sampler = ScriptedSampler::new()
        .arrivals([1.0, 0.5, 0.25])
        .demands([2.0, 1.0, 1.0])
        .priorities([prio(2), prio(9), prio(5)]);
    let (report, sink) = run(config(PolicyKind::PreemptivePriority, 20.0), sampler);

    let order: Vec<_> = waits(&sink).iter().map(|w| (w.0, w.3)).collect();
    assert_eq!(order.len(), 3);
    assert_eq!(order[0], (Pid(1), 0.0));
    assert_eq!(order[1].0, Pid(3));
    assert!((order[1].1 - 1.25).abs() < EPS);
    assert_eq!(order[2].0, Pid(2));
    assert!((order[2].1 - 2.5).abs() < EPS);
    assert_eq!(report.preemptions, 0);
}

#[test]
fn test_policies_agree_without_contention() {
    // Widely spaced arrivals never queue, so every policy behaves alike
    for policy in PolicyKind::ALL {
        let sampler = ScriptedSampler::new()
            .arrivals([1.0, 5.0, 5.0])
            .demands([0.2, 0.2, 0.2]);
        let mut cfg = config(policy, 30.0);
        cfg.rr_quantum = 1.0;
        let (report, _) = run(cfg, sampler);
        assert_eq!(report.processes_completed, 3, "{}", policy);
        assert_eq!(report.preemptions, 0, "{}", policy);
        assert!(report.average_wait.unwrap() < 0.011, "{}", policy);
    }
}
