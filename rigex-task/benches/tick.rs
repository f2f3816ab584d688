use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use pprof::criterion::{Output, PProfProfiler};
use rigex_core::{Cue, DistanceCondition, HwEvent, RewardSize, Side, TrialCard};
use rigex_task::config::SessionConfig;
use rigex_task::sim::SimRig;
use rigex_task::{MemoryLog, TrialController, TracingLog};
use rigex_timing::ManualClock;
use std::sync::Arc;
use std::time::Duration;

fn controller(sim: &SimRig) -> TrialController<ManualClock> {
    let mut config = SessionConfig::default();
    config.lick_threshold = u32::MAX;
    TrialController::new(
        config,
        ManualClock::new(),
        sim.rig(),
        sim.renderer(),
        Arc::new(TracingLog),
    )
    .unwrap()
    .with_seed(0)
}

fn card() -> TrialCard {
    TrialCard::new(Cue::Sound, DistanceCondition::Short, Side::Left, RewardSize::Small)
}

/// Cost of one control cycle in each phase a trial spends most of its time in.
pub fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));

    group.bench_function("standby_idle", |b| {
        let sim = SimRig::new();
        let mut ctrl = controller(&sim);
        b.iter(|| black_box(ctrl.tick()));
    });

    group.bench_function("initiate_running", |b| {
        let sim = SimRig::new();
        let mut ctrl = controller(&sim);
        ctrl.start_trial(card()).unwrap();
        b.iter(|| {
            sim.treadmill.advance(black_box(0.001));
            black_box(ctrl.tick())
        });
    });

    group.bench_function("reward_licking", |b| {
        let sim = SimRig::new();
        let mut ctrl = controller(&sim);
        ctrl.start_trial(card()).unwrap();
        sim.treadmill.advance(10.0);
        ctrl.tick();
        sim.treadmill.advance(10.0);
        ctrl.tick();
        b.iter(|| {
            ctrl.push_event(HwEvent::LeftEntry);
            black_box(ctrl.tick())
        });
    });

    group.finish();
}

/// A full trial from card to reward, with an in-memory log.
pub fn bench_trial(c: &mut Criterion) {
    c.bench_function("trial_to_reward", |b| {
        b.iter_batched(
            || {
                let sim = SimRig::new();
                let ctrl = TrialController::new(
                    SessionConfig::default(),
                    ManualClock::new(),
                    sim.rig(),
                    sim.renderer(),
                    Arc::new(MemoryLog::new()),
                )
                .unwrap();
                (sim, ctrl)
            },
            |(sim, mut ctrl)| {
                ctrl.start_trial(card()).unwrap();
                sim.treadmill.advance(10.0);
                ctrl.tick();
                sim.treadmill.advance(10.0);
                ctrl.tick();
                ctrl.push_event(HwEvent::LeftEntry);
                black_box(ctrl.tick())
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
        .confidence_level(0.95)
        .noise_threshold(0.02);
    targets = bench_tick, bench_trial
}

criterion_main!(benches);
