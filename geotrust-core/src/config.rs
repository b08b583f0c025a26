//! Configuration file management for geotrust.
//!
//! Reads/writes `~/.geotrust/config.yaml`: home position, trend filter,
//! bounding box, detector thresholds, risk window, buffer sizes and export
//! limits. Missing keys keep their defaults; unknown keys are ignored; a bad
//! number or an inconsistent section is an error.

use std::path::{Path, PathBuf};

use crate::engine::EngineConfig;
use crate::export::ExportConfig;
use crate::types::{BoundingBox, Coordinate, GeoTrustError, Result};

/// Dhaka, the home position of the reference map.
pub const DEFAULT_HOME: Coordinate = Coordinate {
    lat: 23.7771,
    lng: 90.3994,
};

/// Full configuration structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub home: Coordinate,
    pub engine: EngineConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            home: DEFAULT_HOME,
            engine: EngineConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.home.validate()?;
        self.engine.validate()
    }
}

/// Get the config directory path (`~/.geotrust/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".geotrust")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.geotrust/config.yaml`.
///
/// Returns the default config if the file doesn't exist.
pub fn load_config() -> Result<Config> {
    let path = config_file();
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Save config to `~/.geotrust/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

/// Partially filled `bbox:` section. All four edges or none.
#[derive(Default)]
struct BboxEdges {
    min_lat: Option<f64>,
    max_lat: Option<f64>,
    min_lng: Option<f64>,
    max_lng: Option<f64>,
}

impl BboxEdges {
    fn build(self) -> Result<Option<BoundingBox>> {
        match (self.min_lat, self.max_lat, self.min_lng, self.max_lng) {
            (None, None, None, None) => Ok(None),
            (Some(min_lat), Some(max_lat), Some(min_lng), Some(max_lng)) => {
                BoundingBox::new(min_lat, max_lat, min_lng, max_lng).map(Some)
            }
            _ => Err(GeoTrustError::InvalidConfig(
                "bbox needs all of min_lat, max_lat, min_lng, max_lng".into(),
            )),
        }
    }
}

/// Parse simple YAML-like config text.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut bbox = BboxEdges::default();
    let mut current_section: Option<String> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }
        let Some(section) = current_section.as_deref() else {
            continue;
        };

        let f = |v: &str| parse_float_value(v, line_no, key);
        let n = |v: &str| parse_usize_value(v, line_no, key);

        match section {
            "home" => match key {
                "lat" => config.home.lat = f(val)?.unwrap_or(DEFAULT_HOME.lat),
                "lng" => config.home.lng = f(val)?.unwrap_or(DEFAULT_HOME.lng),
                _ => {}
            },
            "filter" => {
                let filter = &mut config.engine.filter;
                match key {
                    "max_speed_mps" => set(&mut filter.max_speed_mps, f(val)?),
                    "history_size" => set(&mut filter.history_size, n(val)?),
                    _ => {}
                }
            }
            "bbox" => match key {
                "min_lat" => bbox.min_lat = f(val)?,
                "max_lat" => bbox.max_lat = f(val)?,
                "min_lng" => bbox.min_lng = f(val)?,
                "max_lng" => bbox.max_lng = f(val)?,
                _ => {}
            },
            "detector" => {
                let d = &mut config.engine.detector;
                match key {
                    "max_speed_kmh" => set(&mut d.max_speed_kmh, f(val)?),
                    "teleport_speed_mps" => set(&mut d.teleport_speed_mps, f(val)?),
                    "teleport_min_distance_m" => set(&mut d.teleport_min_distance_m, f(val)?),
                    "max_accuracy_m" => set(&mut d.max_accuracy_m, f(val)?),
                    "stability_window" => set(&mut d.stability_window, n(val)?),
                    "stability_max_variance" => set(&mut d.stability_max_variance, f(val)?),
                    "stability_max_mean_m" => set(&mut d.stability_max_mean_m, f(val)?),
                    _ => {}
                }
            }
            "risk" => {
                let r = &mut config.engine.risk;
                match key {
                    "window_secs" => set(&mut r.window_secs, f(val)?),
                    "medium_alert_threshold" => set(&mut r.medium_alert_threshold, n(val)?),
                    _ => {}
                }
            }
            "engine" => match key {
                "location_capacity" => set(&mut config.engine.location_capacity, n(val)?),
                "alert_capacity" => set(&mut config.engine.alert_capacity, n(val)?),
                _ => {}
            },
            "export" => match key {
                "history_limit" => set(&mut config.export.history_limit, n(val)?),
                "alert_limit" => set(&mut config.export.alert_limit, n(val)?),
                _ => {}
            },
            _ => {}
        }
    }

    config.engine.filter.bbox = bbox.build()?;
    config.validate()?;
    Ok(config)
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn is_null(val: &str) -> bool {
    val == "null" || val == "~" || val.is_empty()
}

fn parse_float_value(val: &str, line_no: usize, key: &str) -> Result<Option<f64>> {
    if is_null(val) {
        return Ok(None);
    }
    val.parse()
        .map(Some)
        .map_err(|_| GeoTrustError::Parse(format!("line {line_no}: {key}: bad number {val:?}")))
}

fn parse_usize_value(val: &str, line_no: usize, key: &str) -> Result<Option<usize>> {
    if is_null(val) {
        return Ok(None);
    }
    val.parse()
        .map(Some)
        .map_err(|_| GeoTrustError::Parse(format!("line {line_no}: {key}: bad integer {val:?}")))
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let e = &config.engine;
    let mut lines = vec!["# geotrust configuration".to_string(), String::new()];

    lines.push("home:".into());
    lines.push(format!("  lat: {}", config.home.lat));
    lines.push(format!("  lng: {}", config.home.lng));
    lines.push(String::new());

    lines.push("filter:".into());
    lines.push(format!("  max_speed_mps: {}", e.filter.max_speed_mps));
    lines.push(format!("  history_size: {}", e.filter.history_size));
    lines.push(String::new());

    lines.push("bbox:".into());
    match &e.filter.bbox {
        Some(b) => {
            lines.push(format!("  min_lat: {}", b.min_lat));
            lines.push(format!("  max_lat: {}", b.max_lat));
            lines.push(format!("  min_lng: {}", b.min_lng));
            lines.push(format!("  max_lng: {}", b.max_lng));
        }
        None => {
            for key in ["min_lat", "max_lat", "min_lng", "max_lng"] {
                lines.push(format!("  {key}: null"));
            }
        }
    }
    lines.push(String::new());

    lines.push("detector:".into());
    lines.push(format!("  max_speed_kmh: {}", e.detector.max_speed_kmh));
    lines.push(format!("  teleport_speed_mps: {}", e.detector.teleport_speed_mps));
    lines.push(format!("  teleport_min_distance_m: {}", e.detector.teleport_min_distance_m));
    lines.push(format!("  max_accuracy_m: {}", e.detector.max_accuracy_m));
    lines.push(format!("  stability_window: {}", e.detector.stability_window));
    lines.push(format!("  stability_max_variance: {}", e.detector.stability_max_variance));
    lines.push(format!("  stability_max_mean_m: {}", e.detector.stability_max_mean_m));
    lines.push(String::new());

    lines.push("risk:".into());
    lines.push(format!("  window_secs: {}", e.risk.window_secs));
    lines.push(format!("  medium_alert_threshold: {}", e.risk.medium_alert_threshold));
    lines.push(String::new());

    lines.push("engine:".into());
    lines.push(format!("  location_capacity: {}", e.location_capacity));
    lines.push(format!("  alert_capacity: {}", e.alert_capacity));
    lines.push(String::new());

    lines.push("export:".into());
    lines.push(format!("  history_limit: {}", config.export.history_limit));
    lines.push(format!("  alert_limit: {}", config.export.alert_limit));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
