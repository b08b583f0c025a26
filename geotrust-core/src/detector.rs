//! Spoofing heuristics over the location history.
//!
//! Each `analyze` call looks at the newest two samples (speed, teleportation,
//! accuracy) and the newest `stability_window` samples (signal pattern).
//! Checks are independent; each emits at most one alert per call.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geo;
use crate::history::LocationHistory;
use crate::types::{AlertData, DetectionAlert, GeoTrustError, LocationSample, Result, Severity};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_SPEED_KMH: f64 = 120.0;
const TELEPORT_SPEED_MPS: f64 = 33.33; // ~120 km/h
const TELEPORT_MIN_DISTANCE_M: f64 = 100.0;
const MAX_ACCURACY_M: f64 = 50.0;
const STABILITY_WINDOW: usize = 5;
const STABILITY_MAX_VARIANCE: f64 = 0.1;
const STABILITY_MAX_MEAN_M: f64 = 3.0;

const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    pub max_speed_kmh: f64,
    pub teleport_speed_mps: f64,
    pub teleport_min_distance_m: f64,
    pub max_accuracy_m: f64,
    pub stability_window: usize,
    pub stability_max_variance: f64,
    pub stability_max_mean_m: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            max_speed_kmh: MAX_SPEED_KMH,
            teleport_speed_mps: TELEPORT_SPEED_MPS,
            teleport_min_distance_m: TELEPORT_MIN_DISTANCE_M,
            max_accuracy_m: MAX_ACCURACY_M,
            stability_window: STABILITY_WINDOW,
            stability_max_variance: STABILITY_MAX_VARIANCE,
            stability_max_mean_m: STABILITY_MAX_MEAN_M,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_speed_kmh", self.max_speed_kmh),
            ("teleport_speed_mps", self.teleport_speed_mps),
            ("max_accuracy_m", self.max_accuracy_m),
        ];
        for (name, v) in positive {
            if !v.is_finite() || v <= 0.0 {
                return Err(GeoTrustError::InvalidConfig(format!(
                    "{name} must be > 0, got {v}"
                )));
            }
        }
        let non_negative = [
            ("teleport_min_distance_m", self.teleport_min_distance_m),
            ("stability_max_variance", self.stability_max_variance),
            ("stability_max_mean_m", self.stability_max_mean_m),
        ];
        for (name, v) in non_negative {
            if !v.is_finite() || v < 0.0 {
                return Err(GeoTrustError::InvalidConfig(format!(
                    "{name} must be >= 0, got {v}"
                )));
            }
        }
        if self.stability_window < 2 {
            return Err(GeoTrustError::InvalidConfig(format!(
                "stability_window must be >= 2, got {}",
                self.stability_window
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Stateless apart from its thresholds; reads history, never mutates it.
#[derive(Debug, Clone, Default)]
pub struct SpoofingDetector {
    pub config: DetectorConfig,
}

impl SpoofingDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(SpoofingDetector { config })
    }

    /// Run all checks against the newest samples. Alerts are stamped `now`.
    pub fn analyze(&self, history: &LocationHistory, now: f64) -> Vec<DetectionAlert> {
        let mut alerts = Vec::new();
        if history.len() < 2 {
            return alerts;
        }

        let recent = history.recent_chronological(2);
        let (prev, current) = (recent[0], recent[1]);

        let distance = geo::distance(&prev.coordinate, &current.coordinate);
        let dt_seconds = current.timestamp - prev.timestamp;

        // Out-of-order or duplicate timestamps: no meaningful speed this tick.
        if dt_seconds > 0.0 {
            let speed_kmh = distance / dt_seconds * MPS_TO_KMH;
            self.check_impossible_speed(speed_kmh, now, &mut alerts);
            self.check_teleportation(distance, dt_seconds, now, &mut alerts);
        }
        self.check_accuracy(current, now, &mut alerts);

        let window = history.recent_chronological(self.config.stability_window);
        self.check_signal_pattern(&window, now, &mut alerts);

        for alert in alerts.iter().filter(|a| a.severity == Severity::High) {
            warn!(kind = alert.kind(), "{}", alert.message);
        }
        alerts
    }

    fn check_impossible_speed(&self, speed_kmh: f64, now: f64, alerts: &mut Vec<DetectionAlert>) {
        let threshold = self.config.max_speed_kmh;
        if speed_kmh <= threshold {
            return;
        }
        alerts.push(DetectionAlert::new(
            now,
            Severity::High,
            format!("Impossible speed detected: {speed_kmh:.1} km/h"),
            Some(AlertData::SpeedExceeded {
                speed: speed_kmh,
                threshold,
            }),
        ));
    }

    fn check_teleportation(
        &self,
        distance: f64,
        dt_seconds: f64,
        now: f64,
        alerts: &mut Vec<DetectionAlert>,
    ) {
        let min_time_for_distance = distance / self.config.teleport_speed_mps;
        if dt_seconds >= min_time_for_distance || distance <= self.config.teleport_min_distance_m {
            return;
        }
        alerts.push(DetectionAlert::new(
            now,
            Severity::High,
            format!("Possible teleportation: {distance:.0}m in {dt_seconds:.1}s"),
            Some(AlertData::Teleportation {
                distance,
                dt_seconds,
            }),
        ));
    }

    fn check_accuracy(&self, current: &LocationSample, now: f64, alerts: &mut Vec<DetectionAlert>) {
        let accuracy = current.accuracy_m;
        if accuracy <= self.config.max_accuracy_m {
            return;
        }
        alerts.push(DetectionAlert::new(
            now,
            Severity::Medium,
            format!("Poor GPS accuracy: \u{b1}{accuracy:.1}m"),
            Some(AlertData::AccuracyAnomaly { accuracy }),
        ));
    }

    /// Real GPS noise wanders; a run of near-identical, near-perfect accuracy
    /// values is a replay/simulator artifact.
    fn check_signal_pattern(
        &self,
        window: &[&LocationSample],
        now: f64,
        alerts: &mut Vec<DetectionAlert>,
    ) {
        if window.len() < self.config.stability_window {
            return;
        }
        let (mean, variance) = mean_and_variance(window.iter().map(|s| s.accuracy_m));
        if variance >= self.config.stability_max_variance || mean >= self.config.stability_max_mean_m {
            return;
        }
        alerts.push(DetectionAlert::new(
            now,
            Severity::Medium,
            "Suspiciously consistent GPS accuracy detected",
            Some(AlertData::SignalPattern {
                variance,
                mean_accuracy: mean,
            }),
        ));
    }
}

/// Mean and population variance. Returns `(0, 0)` for an empty input.
pub fn mean_and_variance(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, variance)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
