//! Periodic driver for `geotrust simulate`.
//!
//! Every tick: feed one real-GPS fix (unless the engine is in simulation
//! mode), then run the detector. A scenario, when requested, starts at a
//! given tick. In real time its fixes are applied by a spawned task on their
//! own schedule; in `--fast` mode they are applied inline against the manual
//! clock, starting half an interval after the tick.

use std::sync::PoisonError;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use geotrust_core::clock::{Clock, ManualClock};
use geotrust_core::engine::{Engine, SharedEngine};
use geotrust_core::simulation::{
    GpsSimulator, PlannedFix, Scenario, ScenarioPlan, SCENARIO_ALERT_DELAY_SECS,
};
use geotrust_core::types::{GeoTrustError, Result};

pub enum Pace {
    RealTime,
    Fast(ManualClock),
}

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub scenario: Option<Scenario>,
    /// Tick at which the scenario starts.
    pub scenario_at: u64,
    /// Ticks after the scenario before returning to real GPS. `None` stays simulated.
    pub reset_after: Option<u64>,
    /// 0 runs until Ctrl-C.
    pub ticks: u64,
    pub interval_secs: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Fix(PlannedFix),
    Announce,
}

/// Scenario fixes and the descriptive alert, ordered by offset.
fn schedule(plan: &ScenarioPlan) -> Vec<(f64, Step)> {
    let mut steps: Vec<(f64, Step)> = plan
        .fixes
        .iter()
        .map(|f| (f.offset_secs, Step::Fix(*f)))
        .collect();
    steps.push((SCENARIO_ALERT_DELAY_SECS, Step::Announce));
    steps.sort_by(|a, b| a.0.total_cmp(&b.0));
    steps
}

fn lock(engine: &SharedEngine) -> std::sync::MutexGuard<'_, Engine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_step(engine: &SharedEngine, plan: &ScenarioPlan, step: Step) -> String {
    let mut engine = lock(engine);
    match step {
        Step::Fix(fix) => match engine.apply_simulated_location(&fix) {
            Ok(outcome) => match outcome.rejection {
                None => format!("fix {} (\u{b1}{:.0}m) accepted as center", fix.coordinate, fix.accuracy_m),
                Some(reason) => format!("fix {} not trusted: {reason}", fix.coordinate),
            },
            Err(e) => format!("fix dropped: {e}"),
        },
        Step::Announce => {
            engine.record_scenario(plan);
            plan.alert_message.to_string()
        }
    }
}

fn spawn_scenario(
    engine: SharedEngine,
    plan: ScenarioPlan,
    events: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now();
        for (offset, step) in schedule(&plan) {
            tokio::time::sleep_until(start + Duration::from_secs_f64(offset)).await;
            let msg = apply_step(&engine, &plan, step);
            if events.send(msg).is_err() {
                break;
            }
        }
    })
}

fn status_line(tick: u64, engine: &Engine, new_alerts: usize) -> String {
    let mode = if engine.is_simulation_mode() { "sim " } else { "real" };
    format!(
        "[{tick:>4}] {mode}  center {}  current {}  risk {:<6}  +{new_alerts} alerts",
        engine.center(),
        engine.current_location(),
        engine.risk().to_string(),
    )
}

pub async fn run(
    engine: &SharedEngine,
    sim: &mut GpsSimulator,
    pace: &Pace,
    opts: &SimulateOptions,
) -> Result<RunSummary> {
    if !opts.interval_secs.is_finite() || opts.interval_secs <= 0.0 {
        return Err(GeoTrustError::InvalidConfig(format!(
            "interval must be > 0 seconds, got {}",
            opts.interval_secs
        )));
    }
    if opts.ticks == 0 && matches!(pace, Pace::Fast(_)) {
        return Err(GeoTrustError::InvalidConfig(
            "--fast needs a finite --ticks".into(),
        ));
    }

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(opts.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut summary = RunSummary::default();
    let mut scenario_task: Option<JoinHandle<()>> = None;
    let mut scenario_started: Option<u64> = None;

    while opts.ticks == 0 || summary.ticks < opts.ticks {
        match pace {
            Pace::RealTime => {
                tokio::select! {
                    _ = ticker.tick() => {}
                    Some(msg) = rx.recv() => {
                        println!("       scenario: {msg}");
                        continue;
                    }
                    _ = &mut ctrl_c => {
                        info!("interrupted");
                        summary.interrupted = true;
                        break;
                    }
                }
            }
            Pace::Fast(clock) => clock.advance(opts.interval_secs),
        }
        summary.ticks += 1;
        let tick = summary.ticks;

        let line = {
            let mut engine = lock(engine);
            if !engine.is_simulation_mode() {
                let fix = sim.next_fix(engine.now());
                if let Err(e) = engine.ingest(fix) {
                    warn!("simulated fix dropped: {e}");
                }
            }
            let new_alerts = engine.tick();
            status_line(tick, &engine, new_alerts.len())
        };
        println!("{line}");

        if let Some(scenario) = opts.scenario {
            if tick == opts.scenario_at {
                let from = lock(engine).current_location();
                let plan = scenario.plan(from, sim.rng());
                info!(scenario = %scenario, "starting scenario");
                println!("       scenario: {scenario} starting");
                match pace {
                    Pace::RealTime => {
                        scenario_task = Some(spawn_scenario(engine.clone(), plan, tx.clone()));
                    }
                    Pace::Fast(clock) => {
                        // Between two ticks, so the detector sees a real interval
                        let start = clock.now() + opts.interval_secs / 2.0;
                        for (offset, step) in schedule(&plan) {
                            clock.set(start + offset);
                            println!("       scenario: {}", apply_step(engine, &plan, step));
                        }
                    }
                }
                scenario_started = Some(tick);
            }
        }

        if let (Some(started), Some(after)) = (scenario_started, opts.reset_after) {
            if tick == started + after {
                lock(engine).reset_to_real();
                sim.reset(lock(engine).home());
                println!("       back to real GPS");
            }
        }
    }

    if let Some(task) = scenario_task {
        task.abort();
    }
    while let Ok(msg) = rx.try_recv() {
        println!("       scenario: {msg}");
    }
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
