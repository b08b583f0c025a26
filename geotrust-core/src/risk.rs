//! Risk level derived from the alert log over a trailing time window.

use serde::{Deserialize, Serialize};

use crate::types::{DetectionAlert, GeoTrustError, Result, RiskLevel, Severity};

const WINDOW_SECS: f64 = 60.0;
const MEDIUM_ALERT_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskConfig {
    pub window_secs: f64,
    /// Medium risk needs strictly more Medium alerts than this.
    pub medium_alert_threshold: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            window_secs: WINDOW_SECS,
            medium_alert_threshold: MEDIUM_ALERT_THRESHOLD,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.window_secs.is_finite() || self.window_secs <= 0.0 {
            return Err(GeoTrustError::InvalidConfig(format!(
                "risk window must be > 0 seconds, got {}",
                self.window_secs
            )));
        }
        Ok(())
    }
}

/// Alert counts inside the window plus the level they imply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RiskSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAggregator {
    pub config: RiskConfig,
}

impl RiskAggregator {
    pub fn new(config: RiskConfig) -> Result<Self> {
        config.validate()?;
        Ok(RiskAggregator { config })
    }

    /// Pure function of the alerts and `now`; nothing is cached.
    pub fn current_risk<'a>(
        &self,
        alerts: impl IntoIterator<Item = &'a DetectionAlert>,
        now: f64,
    ) -> RiskLevel {
        self.summarize(alerts, now).level
    }

    pub fn summarize<'a>(
        &self,
        alerts: impl IntoIterator<Item = &'a DetectionAlert>,
        now: f64,
    ) -> RiskSummary {
        let mut summary = RiskSummary::default();
        for alert in alerts {
            if now - alert.timestamp >= self.config.window_secs {
                continue;
            }
            match alert.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
        }
        let level = if summary.high > 0 {
            RiskLevel::High
        } else if summary.medium > self.config.medium_alert_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        summary.level = level;
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
