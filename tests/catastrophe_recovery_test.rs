//! Catastrophe handling and recovery-window tests

use std::rc::Rc;

use faultsched::events::{EventKind, MemorySink};
use faultsched::runtime::Sim;
use faultsched::scheduler::{self, PollIntervals, Scheduler};
use faultsched::{
    Pid, PolicyKind, Priority, Process, ScriptedSampler, SimConfig, SimContext, Simulation,
};

fn scheduler_for(policy: PolicyKind) -> (Sim, Rc<SimContext>, Rc<dyn Scheduler>, MemorySink) {
    let sim = Sim::new();
    let sink = MemorySink::new();
    let ctx = Rc::new(SimContext::new(sim.clone(), Box::new(sink.clone())));
    let scheduler = scheduler::build(policy, Rc::clone(&ctx), 0.3, PollIntervals::default());
    sim.spawn("scheduler", Rc::clone(&scheduler).run());
    (sim, ctx, scheduler, sink)
}

#[test]
fn test_catastrophe_clears_every_ready_structure() {
    for policy in PolicyKind::ALL {
        let (sim, ctx, scheduler, sink) = scheduler_for(policy);
        let queued = 4;
        for pid in 0..=queued {
            scheduler.add_process(Process::new(Pid(pid), 0.0, 10.0, Priority::LOWEST));
        }
        sim.run_until(1.0).unwrap();
        assert!(!scheduler.cpu().is_idle(), "{}", policy);

        ctx.fail();
        scheduler.handle_catastrophe();
        assert_eq!(scheduler.queued(), 0, "{}", policy);
        sim.run_until(1.5).unwrap();

        assert!(scheduler.cpu().is_idle(), "{}", policy);
        assert_eq!(scheduler.cpu().queue_len(), 0, "{}", policy);
        let interrupted = sink.filter(|kind| matches!(kind, EventKind::Interrupt { .. }));
        match policy {
            // Every admitted process has its own activity
            PolicyKind::PreemptivePriority => assert_eq!(interrupted.len(), queued as usize + 1),
            _ => {
                assert_eq!(interrupted.len(), 1, "{}", policy);
                assert_eq!(interrupted[0].time, 1.0);
            }
        }
        assert_eq!(ctx.metrics().lost(), queued + 1, "{}", policy);
        assert_eq!(ctx.metrics().completed(), 0, "{}", policy);
        sim.shutdown();
    }
}

#[test]
fn test_no_work_resumes_while_down() {
    for policy in PolicyKind::ALL {
        let (sim, ctx, scheduler, sink) = scheduler_for(policy);
        scheduler.add_process(Process::new(Pid(1), 0.0, 1.0, Priority::LOWEST));
        sim.run_until(0.5).unwrap();

        ctx.fail();
        scheduler.handle_catastrophe();
        let before = sink.len();
        sim.run_until(20.0).unwrap();

        let after: Vec<_> = sink.events().into_iter().skip(before).collect();
        assert!(
            after.iter().all(|event| matches!(event.kind, EventKind::Interrupt { .. })),
            "{}: {:?}",
            policy,
            after
        );
        sim.shutdown();
    }
}

#[test]
fn test_recovery_sample_measures_backlog_drain() {
    let restored_at = 5.05;
    for policy in PolicyKind::ALL {
        let (sim, ctx, scheduler, sink) = scheduler_for(policy);
        sim.run_until(1.0).unwrap();
        ctx.fail();
        scheduler.handle_catastrophe();

        sim.run_until(restored_at).unwrap();
        ctx.restore(restored_at - 1.0);
        scheduler.begin_recovery();
        scheduler.add_process(Process::new(Pid(1), restored_at, 2.0, Priority::LOWEST));
        assert!(scheduler.is_recovering(), "{}", policy);

        // More work lands while the backlog is still draining
        sim.run_until(6.0).unwrap();
        assert!(scheduler.is_recovering(), "{}", policy);
        scheduler.add_process(Process::new(Pid(2), 6.0, 1.0, Priority::LOWEST));

        sim.run_until(30.0).unwrap();
        assert!(!scheduler.is_recovering(), "{}", policy);
        let drained_at = sink
            .filter(|kind| matches!(kind, EventKind::Complete { .. }))
            .last()
            .map(|event| event.time)
            .unwrap();
        let drain = drained_at - restored_at;
        assert!(drain >= 3.0 - 1e-6, "{}: {}", policy, drain);

        let samples = ctx.metrics().recovery_times().to_vec();
        assert_eq!(samples.len(), 1, "{}", policy);
        // Priority scheduling checks for a drained system on its down-poll
        let slack = PollIntervals::default().down + 1e-9;
        assert!(
            samples[0] >= drain - 1e-9 && samples[0] <= drain + slack,
            "{}: sample {} drain {}",
            policy,
            samples[0],
            drain
        );
        sim.shutdown();
    }
}

#[test]
fn test_idle_restoration_records_no_recovery_time() {
    for policy in PolicyKind::ALL {
        let config = SimConfig {
            policy,
            sim_duration: 100.0,
            ..SimConfig::default()
        };
        // Down from 1.0 to 2.0 with nothing queued; first arrival at 10.0
        let sampler = ScriptedSampler::new()
            .arrivals([10.0])
            .demands([5.0])
            .failures([1.0])
            .repairs([1.0]);
        let sink = MemorySink::new();
        let report = Simulation::new(config)
            .unwrap()
            .with_sampler(sampler)
            .with_sink(sink.clone())
            .run()
            .unwrap();

        assert_eq!(report.restorations, 1, "{}", policy);
        assert_eq!(report.processes_completed, 1, "{}", policy);
        assert!(
            report.mttr.map_or(true, |mttr| mttr <= PollIntervals::default().down + 1e-9),
            "{}: {:?}",
            policy,
            report.mttr
        );
        for event in sink.filter(|kind| matches!(kind, EventKind::Recovery { .. })) {
            assert!(event.time < 10.0, "{}: window open until {}", policy, event.time);
        }
    }
}

#[test]
fn test_new_catastrophe_cancels_open_window() {
    let (sim, ctx, scheduler, _sink) = scheduler_for(PolicyKind::PreemptivePriority);
    ctx.fail();
    scheduler.handle_catastrophe();
    sim.run_until(2.05).unwrap();
    ctx.restore(2.05);
    scheduler.begin_recovery();
    scheduler.add_process(Process::new(Pid(1), 2.05, 5.0, Priority::HIGHEST));

    sim.run_until(3.0).unwrap();
    assert!(scheduler.is_recovering());
    ctx.fail();
    scheduler.handle_catastrophe();
    assert!(!scheduler.is_recovering());

    sim.run_until(30.0).unwrap();
    assert!(ctx.metrics().recovery_times().is_empty());
    sim.shutdown();
}

#[test]
fn test_single_scripted_catastrophe() {
    let horizon = 100.0;
    let (failure_at, repair) = (30.0, 12.5);
    let config = SimConfig {
        policy: PolicyKind::RoundRobin,
        sim_duration: horizon,
        ..SimConfig::default()
    };
    let sampler = ScriptedSampler::new()
        .arrivals([10.0, 15.0, 10.0])
        .demands([0.5, 10.0, 0.5])
        .failures([failure_at])
        .repairs([repair]);
    let sink = MemorySink::new();
    let report = Simulation::new(config)
        .unwrap()
        .with_sampler(sampler)
        .with_sink(sink.clone())
        .run()
        .unwrap();

    assert_eq!(report.total_downtime, repair);
    assert!((report.availability - (horizon - repair) / horizon * 100.0).abs() < 1e-9);
    assert_eq!(report.catastrophes, 1);
    assert_eq!(report.restorations, 1);
    assert!(report.recovery_samples <= 1);
    // The second process was mid-service at the failure
    assert_eq!(report.processes_lost, 1);
    assert_eq!(report.processes_completed, 2);

    let catastrophes = sink.filter(|kind| matches!(kind, EventKind::Catastrophe));
    let restorations = sink.filter(|kind| matches!(kind, EventKind::Restoration { .. }));
    assert_eq!(catastrophes[0].time, failure_at);
    assert_eq!(restorations[0].time, failure_at + repair);
}

#[test]
fn test_repair_beyond_horizon_is_not_downtime() {
    let config = SimConfig {
        policy: PolicyKind::Fcfs,
        sim_duration: 50.0,
        ..SimConfig::default()
    };
    let sampler = ScriptedSampler::new().failures([40.0]).repairs([20.0]);
    let report = Simulation::new(config)
        .unwrap()
        .with_sampler(sampler)
        .run()
        .unwrap();

    assert_eq!(report.catastrophes, 1);
    assert_eq!(report.restorations, 0);
    assert_eq!(report.availability, 100.0);
    assert_eq!(report.mttr, None);
}
