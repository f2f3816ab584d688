use crate::mouse::SimMouse;
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rigex_core::HwEvent;
use rigex_task::sim::SimRig;
use rigex_task::{MemoryLog, SessionConfig, SessionRunner, TrialController};
use rigex_timing::{Clock, HighPrecisionTimer, Ticker};
use std::env;
use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const STIMULUS_SERVICE_PERIOD: Duration = Duration::from_millis(1);

struct Args {
    config_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    seed: Option<u64>,
    max_trials: Option<u32>,
}

impl Args {
    fn from_env_and_args() -> Self {
        let mut config_path = env::var("RIGEX_CONFIG").ok().map(PathBuf::from);
        let mut log_path = None;
        let mut seed = env::var("RIGEX_SEED").ok().and_then(|s| s.parse::<u64>().ok());
        let mut max_trials = None;

        let mut args = env::args().skip(1);
        while let Some(a) = args.next() {
            match a.as_str() {
                "--config" => config_path = args.next().map(PathBuf::from),
                "--log" => log_path = args.next().map(PathBuf::from),
                "--seed" => seed = args.next().and_then(|v| v.parse::<u64>().ok()),
                "--max-trials" => max_trials = args.next().and_then(|v| v.parse::<u32>().ok()),
                other => warn!(arg = other, "ignoring unknown argument"),
            }
        }

        Self {
            config_path,
            log_path,
            seed,
            max_trials,
        }
    }
}

/// Dry-run session on a simulated rig.
pub struct App {
    config: SessionConfig,
    log_path: Option<PathBuf>,
    seed: Option<u64>,
}

impl App {
    pub fn new() -> Result<Self> {
        let args = Args::from_env_and_args();
        let mut config = match &args.config_path {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("loading session config {}", path.display()))?,
            None => SessionConfig::default(),
        };
        if args.max_trials.is_some() {
            config.session.max_trials = args.max_trials;
        }
        config.validate().context("invalid session config")?;

        Ok(Self {
            config,
            log_path: args.log_path,
            seed: args.seed,
        })
    }

    fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_os_rng(),
        }
    }

    pub fn run(self) -> Result<()> {
        println!("=== RIG TRIAL CONTROLLER (simulated rig) ===");
        println!("Mouse: {}", self.config.mouse_name);
        println!("Type `q` + Enter to quit, `d` + Enter to start a dark period.\n");

        let sim = SimRig::new();
        let clock = HighPrecisionTimer::new();
        let log = MemoryLog::echoing();
        let (tx, rx) = mpsc::channel();
        let tick_interval = self.config.session.tick_interval();

        let mut controller = TrialController::new(
            self.config.clone(),
            clock.clone(),
            sim.rig(),
            sim.renderer(),
            Arc::new(log.clone()),
        )?
        .with_event_source(rx);
        if let Some(seed) = self.seed {
            controller = controller.with_seed(seed);
        }

        let stimulus = controller.stimulus().clone();
        let mut service = Ticker::spawn(
            "stimulus",
            clock.clone(),
            STIMULUS_SERVICE_PERIOD,
            move |now| {
                stimulus.service(now);
            },
        )?;

        let mut mouse = SimMouse::new(sim.treadmill.clone(), tx.clone(), self.rng(1));
        let mut behaviour = Ticker::spawn("mouse", clock.clone(), tick_interval, move |_| {
            mouse.step();
        })?;

        spawn_keyboard(tx)?;

        let mut runner = SessionRunner::new(controller, self.rng(2));
        let summary = runner.run();

        behaviour.stop();
        service.stop();
        info!(
            elapsed_s = Duration::from_nanos(clock.now()).as_secs_f64(),
            dispensed = sim.pump.dispensed().len(),
            "dry run finished"
        );

        if let Some(path) = &self.log_path {
            let lines = log.to_json_lines()?;
            fs::write(path, lines).with_context(|| format!("writing log {}", path.display()))?;
        }
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}

/// Forwards typed keys as key-press events. The thread ends with stdin or
/// when the session drops the receiver.
fn spawn_keyboard(tx: Sender<HwEvent>) -> io::Result<()> {
    thread::Builder::new().name("keyboard".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            for key in line.chars().filter(|c| !c.is_whitespace()) {
                if tx.send(HwEvent::KeyPress(key)).is_err() {
                    return;
                }
            }
        }
    })?;
    Ok(())
}
