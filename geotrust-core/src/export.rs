//! Diagnostic session snapshot: the JSON file written by `geotrust ... --export`
//! and read back by `geotrust inspect`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::risk::{RiskAggregator, RiskConfig};
use crate::simulation::SimulationState;
use crate::types::*;

const HISTORY_LIMIT: usize = 20;
const ALERT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Newest samples kept, written oldest first.
    pub history_limit: usize,
    /// Newest alerts kept, written newest first.
    pub alert_limit: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            history_limit: HISTORY_LIMIT,
            alert_limit: ALERT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(with = "iso_timestamp")]
    pub timestamp: f64,
    pub current_location: Coordinate,
    pub location_history: Vec<LocationSample>,
    pub detection_alerts: Vec<DetectionAlert>,
    pub spoofing_risk_level: RiskLevel,
    pub test_session: SimulationState,
}

impl Snapshot {
    /// Copy the exportable part of the engine state at the engine's `now`.
    pub fn capture(engine: &Engine, config: &ExportConfig) -> Self {
        Snapshot {
            timestamp: engine.now(),
            current_location: engine.current_location(),
            location_history: engine
                .locations()
                .recent_chronological(config.history_limit)
                .into_iter()
                .copied()
                .collect(),
            detection_alerts: engine.alerts().recent_cloned(config.alert_limit),
            spoofing_risk_level: engine.risk(),
            test_session: *engine.simulation(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut text = self.to_json_pretty()?;
        text.push('\n');
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Recompute the risk level from the exported alerts at snapshot time.
    ///
    /// Only the newest `alert_limit` alerts survive export, so this can read
    /// lower than `spoofing_risk_level`.
    pub fn derived_risk(&self, config: RiskConfig) -> Result<RiskLevel> {
        let aggregator = RiskAggregator::new(config)?;
        Ok(aggregator.current_risk(&self.detection_alerts, self.timestamp))
    }
}

/// `gps-test-data-YYYY-MM-DDTHH:MM:SS.json` for a snapshot taken at `ts`.
pub fn default_filename(ts: f64) -> String {
    let stamp = chrono::DateTime::from_timestamp(ts.floor() as i64, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{}", ts.floor() as i64));
    format!("gps-test-data-{stamp}.json")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
