//! geotrust: replay, simulate and inspect GPS trust sessions.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use geotrust_core::clock::{Clock, ManualClock, SystemClock};
use geotrust_core::config::{self, Config};
use geotrust_core::engine::Engine;
use geotrust_core::export::{self, Snapshot};
use geotrust_core::simulation::{GpsSimulator, Scenario};
use geotrust_core::types::*;

mod input;
mod logging;
mod report;
mod simulate;

#[derive(Parser)]
#[command(name = "geotrust", version, about = "GPS location trust and spoofing detection")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (default: ~/.geotrust/config.yaml)
    #[arg(long, global = true, env = "GEOTRUST_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line overrides applied on top of the config file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Home position as "lat,lng"
    #[arg(long, global = true, value_parser = parse_coordinate, allow_hyphen_values = true)]
    home: Option<Coordinate>,

    /// Trend filter speed gate, m/s
    #[arg(long, global = true)]
    max_speed: Option<f64>,

    /// Accepted centers kept for the median check
    #[arg(long, global = true)]
    history_size: Option<usize>,

    /// Bounding box as "minLat,maxLat,minLng,maxLng"
    #[arg(long, global = true, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a sample file through the engine and report alerts and risk
    Analyze {
        /// Sample file, one sample per line, or "-" for stdin
        file: PathBuf,

        /// Write a session snapshot to this path
        #[arg(long)]
        export: Option<PathBuf>,

        /// Log rejected center moves as High alerts
        #[arg(long)]
        alert_on_reject: bool,

        /// Seconds between samples that carry no timestamp
        #[arg(long, default_value_t = input::DEFAULT_STEP_SECS)]
        step: f64,
    },

    /// Drive the engine from a simulated receiver, optionally injecting a spoofing scenario
    Simulate {
        /// teleport, impossible-speed, signal-jump or indoor-outdoor
        #[arg(long)]
        scenario: Option<Scenario>,

        /// Tick at which the scenario starts
        #[arg(long, default_value_t = 3)]
        scenario_at: u64,

        /// Return to real GPS this many ticks after the scenario
        #[arg(long)]
        reset_after: Option<u64>,

        /// Number of ticks (0 = until Ctrl-C)
        #[arg(long, default_value_t = 15)]
        ticks: u64,

        /// Seconds between ticks
        #[arg(long, default_value_t = 2.0)]
        interval: f64,

        /// RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Run on a manual clock without sleeping
        #[arg(long)]
        fast: bool,

        /// Write a session snapshot; a directory gets the default file name
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Print an exported session snapshot
    Inspect {
        /// Snapshot JSON file
        file: PathBuf,
    },

    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_numbers(s: &str, n: usize) -> std::result::Result<Vec<f64>, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|_| format!("bad number {:?}", v.trim())))
        .collect::<std::result::Result<Vec<f64>, String>>()?;
    if values.len() != n {
        return Err(format!("expected {n} comma-separated numbers, got {}", values.len()));
    }
    Ok(values)
}

fn parse_coordinate(s: &str) -> std::result::Result<Coordinate, String> {
    let v = parse_numbers(s, 2)?;
    Coordinate::new(v[0], v[1]).map_err(|e| e.to_string())
}

fn parse_bbox(s: &str) -> std::result::Result<BoundingBox, String> {
    let v = parse_numbers(s, 4)?;
    BoundingBox::new(v[0], v[1], v[2], v[3]).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config_path = cli.config.as_deref();
    let overrides = &cli.overrides;

    let result = match cli.command {
        Commands::Analyze {
            file,
            export,
            alert_on_reject,
            step,
        } => effective_config(config_path, overrides).and_then(|config| {
            cmd_analyze(&config, &file, export.as_deref(), alert_on_reject, step)
        }),
        Commands::Simulate {
            scenario,
            scenario_at,
            reset_after,
            ticks,
            interval,
            seed,
            fast,
            export,
        } => {
            let opts = simulate::SimulateOptions {
                scenario,
                scenario_at,
                reset_after,
                ticks,
                interval_secs: interval,
            };
            match effective_config(config_path, overrides) {
                Ok(config) => cmd_simulate(&config, opts, seed, fast, export.as_deref()).await,
                Err(e) => Err(e),
            }
        }
        Commands::Inspect { file } => effective_config(config_path, overrides)
            .and_then(|config| cmd_inspect(&config, &file)),
        Commands::Config { action } => cmd_config(config_path, overrides, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Config file (explicit path, else `~/.geotrust/config.yaml`) plus overrides.
fn effective_config(path: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut config = match path {
        Some(p) => config::load_config_from(p)?,
        None => config::load_config()?,
    };
    if let Some(home) = overrides.home {
        config.home = home;
    }
    let filter = &mut config.engine.filter;
    if let Some(v) = overrides.max_speed {
        filter.max_speed_mps = v;
    }
    if let Some(v) = overrides.history_size {
        filter.history_size = v;
    }
    if let Some(b) = overrides.bbox {
        filter.bbox = Some(b);
    }
    config.validate()?;
    Ok(config)
}

fn cmd_analyze(
    config: &Config,
    file: &Path,
    export_path: Option<&Path>,
    alert_on_reject: bool,
    step: f64,
) -> Result<()> {
    let reader = input::open_input(file)?;
    let mut parser = input::SampleParser::new(0.0, step);
    let mut samples = Vec::new();
    let mut bad_lines = 0u64;

    for line in reader.lines() {
        let line = line?;
        match parser.parse_line(&line) {
            Ok(Some(sample)) => samples.push(sample),
            Ok(None) => {}
            Err(e) => {
                warn!("skipping {e}");
                bad_lines += 1;
            }
        }
    }

    if samples.is_empty() {
        println!("No samples in {}", file.display());
        return Ok(());
    }

    // The first valid fix seeds the trend filter and the clock
    let (home, start) = match samples.iter().find(|s| s.validate().is_ok()) {
        Some(seed) => (seed.coordinate, seed.timestamp),
        None => {
            warn!("no valid samples, seeding from configured home {}", config.home);
            let start = samples
                .iter()
                .map(|s| s.timestamp)
                .find(|t| t.is_finite())
                .unwrap_or(0.0);
            (config.home, start)
        }
    };
    let clock = ManualClock::new(start);
    let mut engine = Engine::new(home, config.engine, Arc::new(clock.clone()))?;
    info!(samples = samples.len(), %home, "replaying");

    for sample in &samples {
        if sample.timestamp.is_finite() {
            clock.set(sample.timestamp);
        }
        match engine.ingest(*sample) {
            Ok(outcome) => {
                if let (Some(reason), true) = (outcome.rejection, alert_on_reject) {
                    engine.record_rejection(sample.coordinate, &reason);
                }
            }
            Err(_) => continue,
        }
        engine.tick();
    }

    println!();
    println!("Replay complete: {}", file.display());
    println!(
        "  Samples: {} read, {} ingested, {} invalid, {} unparsable lines",
        samples.len(),
        engine.samples_ingested,
        engine.samples_invalid,
        bad_lines
    );
    println!(
        "  Center: {} accepted, {} rejected; final {}",
        engine.filter().accepted,
        engine.filter().rejected,
        engine.center()
    );
    println!("  Alerts: {} emitted, {} kept", engine.alerts_emitted, engine.alerts().len());
    println!();

    if !engine.alerts().is_empty() {
        println!("{}", report::alert_table(engine.alerts()));
        println!();
    }
    report::print_risk(&engine.risk_summary());

    if let Some(path) = export_path {
        write_snapshot(&mut engine, config, path)?;
    }
    Ok(())
}

async fn cmd_simulate(
    config: &Config,
    opts: simulate::SimulateOptions,
    seed: Option<u64>,
    fast: bool,
    export_path: Option<&Path>,
) -> Result<()> {
    let (clock, pace): (Arc<dyn Clock>, simulate::Pace) = if fast {
        let manual = ManualClock::new(SystemClock::new().now());
        (Arc::new(manual.clone()), simulate::Pace::Fast(manual))
    } else {
        (Arc::new(SystemClock::new()), simulate::Pace::RealTime)
    };

    let engine = Engine::new(config.home, config.engine, clock)?.into_shared();
    let mut sim = GpsSimulator::new(config.home, seed);

    println!(
        "Simulating from {} every {}s{}",
        config.home,
        opts.interval_secs,
        if fast { " (fast)" } else { "" }
    );
    let summary = simulate::run(&engine, &mut sim, &pace, &opts).await?;

    let mut engine = engine.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    println!();
    println!(
        "Simulation {} after {} ticks",
        if summary.interrupted { "interrupted" } else { "complete" },
        summary.ticks
    );
    if !engine.alerts().is_empty() {
        println!("{}", report::alert_table(engine.alerts()));
        println!();
    }
    report::print_risk(&engine.risk_summary());

    if let Some(path) = export_path {
        let path = if path.is_dir() {
            path.join(export::default_filename(engine.now()))
        } else {
            path.to_path_buf()
        };
        write_snapshot(&mut engine, config, &path)?;
    }
    Ok(())
}

fn write_snapshot(engine: &mut Engine, config: &Config, path: &Path) -> Result<()> {
    let snapshot = Snapshot::capture(engine, &config.export);
    snapshot.write_to(path)?;
    engine.record_export(snapshot.location_history.len());
    println!("Snapshot written: {}", path.display());
    Ok(())
}

fn cmd_inspect(config: &Config, file: &Path) -> Result<()> {
    let snap = Snapshot::read_from(file)?;
    let derived = snap.derived_risk(config.engine.risk)?;

    println!();
    println!("Snapshot: {}", file.display());
    println!("  Taken:    {}", format_timestamp(snap.timestamp));
    println!("  Location: {}", snap.current_location);
    println!(
        "  Mode:     {}",
        if snap.test_session.is_simulation_mode { "simulation" } else { "real GPS" }
    );
    if snap.test_session.is_simulation_mode {
        let s = &snap.test_session.simulated_location;
        println!(
            "  Simulated: {:.6}, {:.6} at {:.1} km/h, \u{b1}{:.1}m",
            s.lat, s.lng, s.speed, s.accuracy
        );
    }
    println!("  Risk:     {} (recomputed: {derived})", snap.spoofing_risk_level);
    println!();

    if !snap.location_history.is_empty() {
        println!("{}", report::history_table(&snap.location_history));
        println!();
    }
    if !snap.detection_alerts.is_empty() {
        println!("{}", report::alert_table(&snap.detection_alerts));
    }
    Ok(())
}

fn cmd_config(path: Option<&Path>, overrides: &Overrides, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = effective_config(path, overrides)?;
            print!("{}", config::serialize_config(&config));
        }
        ConfigAction::Init { force } => {
            let target = path.map(Path::to_path_buf).unwrap_or_else(config::config_file);
            if target.exists() && !force {
                return Err(GeoTrustError::InvalidConfig(format!(
                    "{} already exists (use --force to overwrite)",
                    target.display()
                )));
            }
            config::save_config_to(&Config::default(), &target)?;
            println!("Wrote {}", target.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_bbox_arg() {
        let b = parse_bbox("23.0, 24.5, 90.0, 91.0").unwrap();
        assert_eq!(b.max_lat, 24.5);
        assert!(parse_bbox("24.5,23.0,90,91").is_err());
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_coordinate("-33.87,151.21").is_ok());
        assert!(parse_coordinate("91,0").is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        config::save_config_to(&Config::default(), &path).unwrap();

        let overrides = Overrides {
            home: Some(Coordinate { lat: 10.0, lng: 20.0 }),
            max_speed: Some(25.0),
            history_size: Some(9),
            bbox: Some(BoundingBox::new(9.0, 11.0, 19.0, 21.0).unwrap()),
        };
        let config = effective_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.home.lat, 10.0);
        assert_eq!(config.engine.filter.max_speed_mps, 25.0);
        assert_eq!(config.engine.filter.history_size, 9);
        assert!(config.engine.filter.bbox.is_some());

        let bad = Overrides {
            history_size: Some(0),
            ..Default::default()
        };
        assert!(effective_config(Some(&path), &bad).is_err());
    }

    #[test]
    fn test_analyze_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("walk.txt");
        let mut text = String::from("# slow walk, then a jump\n");
        for i in 0..6 {
            text.push_str(&format!("23.7771{i},90.3994,5;{}\n", 1_700_000_000 + 2 * i));
        }
        text.push_str("23.8771,90.4994,3;1700000013\n");
        text.push_str("not a sample\n");
        std::fs::write(&samples, text).unwrap();

        let out = dir.path().join("snap.json");
        cmd_analyze(&Config::default(), &samples, Some(&out), true, 2.0).unwrap();

        let snap = Snapshot::read_from(&out).unwrap();
        assert_eq!(snap.location_history.len(), 7);
        assert_eq!(snap.spoofing_risk_level, RiskLevel::High);
        assert!(snap
            .detection_alerts
            .iter()
            .any(|a| a.kind() == "center_rejected"));
    }

    #[test]
    fn test_analyze_seeds_past_invalid_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("far.txt");
        let mut text = String::from("95,10,5;1700000000\n");
        for i in 1..=7 {
            text.push_str(&format!("50.0000{i},10,5;{}\n", 1_700_000_000 + 2 * i));
        }
        std::fs::write(&samples, text).unwrap();

        let out = dir.path().join("snap.json");
        cmd_analyze(&Config::default(), &samples, Some(&out), true, 2.0).unwrap();

        let snap = Snapshot::read_from(&out).unwrap();
        assert_eq!(snap.location_history.len(), 7);
        assert!(snap
            .detection_alerts
            .iter()
            .all(|a| a.kind() != "center_rejected"));
        assert_eq!(snap.spoofing_risk_level, RiskLevel::Low);
        assert!((snap.current_location.lat - 50.00007).abs() < 1e-9);
    }
}
