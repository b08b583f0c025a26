//! Location-trust engine: one stream of samples in, center decisions, alerts
//! and a risk level out.
//!
//! Pure state machine driven by the caller. `ingest()` per position report,
//! `tick()` per analysis interval; nothing here owns a timer. For a
//! multi-threaded host wrap the engine in `SharedEngine` so that ingest, tick
//! and risk queries are serialized through one lock.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::detector::{DetectorConfig, SpoofingDetector};
use crate::history::{AlertLog, HistoryBuffer, LocationHistory, ALERT_CAPACITY, LOCATION_CAPACITY};
use crate::risk::{RiskAggregator, RiskConfig, RiskSummary};
use crate::simulation::{PlannedFix, ScenarioPlan, SimulationState};
use crate::trend::{Rejection, TrendFilter, TrendFilterConfig};
use crate::types::*;

pub type SharedEngine = Arc<Mutex<Engine>>;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub filter: TrendFilterConfig,
    pub detector: DetectorConfig,
    pub risk: RiskConfig,
    pub location_capacity: usize,
    pub alert_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            filter: TrendFilterConfig::default(),
            detector: DetectorConfig::default(),
            risk: RiskConfig::default(),
            location_capacity: LOCATION_CAPACITY,
            alert_capacity: ALERT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        self.detector.validate()?;
        self.risk.validate()?;
        if self.location_capacity == 0 {
            return Err(GeoTrustError::InvalidConfig(format!(
                "location_capacity must be >= 1, got {}",
                self.location_capacity
            )));
        }
        if self.alert_capacity == 0 {
            return Err(GeoTrustError::InvalidConfig(
                "alert_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of feeding one valid sample to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestOutcome {
    pub sample: LocationSample,
    /// `None` when the trend filter moved the center to this sample.
    pub rejection: Option<Rejection>,
}

impl IngestOutcome {
    pub fn center_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    home: Coordinate,

    filter: TrendFilter,
    detector: SpoofingDetector,
    aggregator: RiskAggregator,

    locations: LocationHistory,
    alerts: AlertLog,
    current_location: Coordinate,
    simulation: SimulationState,

    // Counters
    pub samples_ingested: u64,
    pub samples_invalid: u64,
    pub ticks: u64,
    pub alerts_emitted: u64,
}

impl Engine {
    /// Build an engine centered on `home`. Fails fast on invalid config.
    pub fn new(home: Coordinate, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        home.validate()?;
        let now = clock.now();
        Ok(Engine {
            filter: TrendFilter::new(home, config.filter, now)?,
            detector: SpoofingDetector::new(config.detector)?,
            aggregator: RiskAggregator::new(config.risk)?,
            locations: HistoryBuffer::fifo(config.location_capacity),
            alerts: HistoryBuffer::newest_first(config.alert_capacity),
            current_location: home,
            simulation: SimulationState::new(home),
            config,
            clock,
            home,
            samples_ingested: 0,
            samples_invalid: 0,
            ticks: 0,
            alerts_emitted: 0,
        })
    }

    pub fn with_system_clock(home: Coordinate, config: EngineConfig) -> Result<Self> {
        Self::new(home, config, Arc::new(SystemClock::new()))
    }

    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn home(&self) -> Coordinate {
        self.home
    }

    /// Safe center: the last coordinate the trend filter accepted.
    pub fn center(&self) -> Coordinate {
        self.filter.last_center()
    }

    /// Latest reported coordinate, trusted or not.
    pub fn current_location(&self) -> Coordinate {
        self.current_location
    }

    pub fn filter(&self) -> &TrendFilter {
        &self.filter
    }

    pub fn locations(&self) -> &LocationHistory {
        &self.locations
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    pub fn simulation(&self) -> &SimulationState {
        &self.simulation
    }

    pub fn is_simulation_mode(&self) -> bool {
        self.simulation.is_simulation_mode
    }

    // -- sample flow --------------------------------------------------------

    /// Validate a sample, append it to the history, and propose it as the
    /// new center. Invalid samples are counted and dropped.
    pub fn ingest(&mut self, sample: LocationSample) -> Result<IngestOutcome> {
        if let Err(e) = sample.validate() {
            self.samples_invalid += 1;
            warn!("discarding sample: {e}");
            return Err(e);
        }

        self.samples_ingested += 1;
        self.locations.append(sample);
        self.current_location = sample.coordinate;

        let now = self.clock.now();
        let rejection = self.filter.evaluate(sample.coordinate, now).err();
        Ok(IngestOutcome { sample, rejection })
    }

    /// Log a refused center move as a High alert. Optional: callers decide
    /// whether rejections count towards risk.
    pub fn record_rejection(&mut self, candidate: Coordinate, rejection: &Rejection) {
        let now = self.clock.now();
        self.push_alert(DetectionAlert::new(
            now,
            Severity::High,
            format!("Center update rejected: {rejection}"),
            Some(AlertData::CenterRejected {
                lat: candidate.lat,
                lng: candidate.lng,
                reason: rejection.to_string(),
            }),
        ));
    }

    /// One analysis pass over the history. Returns the alerts it logged.
    pub fn tick(&mut self) -> Vec<DetectionAlert> {
        let now = self.clock.now();
        self.ticks += 1;
        let alerts = self.detector.analyze(&self.locations, now);
        for alert in &alerts {
            self.push_alert(alert.clone());
        }
        debug!(
            tick = self.ticks,
            new_alerts = alerts.len(),
            risk = %self.risk(),
            "analysis tick"
        );
        alerts
    }

    pub fn push_alert(&mut self, alert: DetectionAlert) {
        self.alerts_emitted += 1;
        self.alerts.append(alert);
    }

    // -- risk ---------------------------------------------------------------

    pub fn risk(&self) -> RiskLevel {
        self.aggregator.current_risk(&self.alerts, self.clock.now())
    }

    pub fn risk_summary(&self) -> RiskSummary {
        self.aggregator.summarize(&self.alerts, self.clock.now())
    }

    /// Drop every alert. Risk falls back to Low since it is derived.
    pub fn clear_alerts(&mut self) {
        self.alerts = HistoryBuffer::newest_first(self.config.alert_capacity);
    }

    // -- simulation controls ------------------------------------------------

    /// Enter simulation mode and feed one simulated fix through the engine.
    pub fn apply_simulated_location(&mut self, fix: &PlannedFix) -> Result<IngestOutcome> {
        if !self.simulation.is_simulation_mode {
            info!("entering simulation mode");
        }
        let sim = &mut self.simulation;
        sim.is_simulation_mode = true;
        sim.simulated_location.lat = fix.coordinate.lat;
        sim.simulated_location.lng = fix.coordinate.lng;
        sim.simulated_location.accuracy = fix.accuracy_m;
        if let Some(speed) = fix.speed_kmh {
            sim.simulated_location.speed = speed;
        }
        let speed = sim.simulated_location.speed;

        let sample = LocationSample {
            coordinate: fix.coordinate,
            timestamp: self.clock.now(),
            accuracy_m: fix.accuracy_m,
            speed_kmh: Some(speed),
        };
        let outcome = self.ingest(sample)?;

        let now = self.clock.now();
        self.push_alert(DetectionAlert::new(
            now,
            Severity::Low,
            format!(
                "Manual location set: {:.6}, {:.6}",
                fix.coordinate.lat, fix.coordinate.lng
            ),
            Some(AlertData::ManualLocation {
                lat: fix.coordinate.lat,
                lng: fix.coordinate.lng,
            }),
        ));
        Ok(outcome)
    }

    /// Log the descriptive alert that accompanies a scenario run.
    pub fn record_scenario(&mut self, plan: &ScenarioPlan) {
        let now = self.clock.now();
        self.push_alert(DetectionAlert::new(
            now,
            plan.alert_severity,
            plan.alert_message,
            Some(plan.alert_data()),
        ));
    }

    /// Leave simulation mode and return to the home position.
    ///
    /// Returns whether the trend filter accepted home as the center.
    pub fn reset_to_real(&mut self) -> bool {
        info!("leaving simulation mode");
        self.simulation.is_simulation_mode = false;
        self.current_location = self.home;

        let now = self.clock.now();
        let accepted = self.filter.propose(self.home, now);
        self.push_alert(DetectionAlert::new(
            now,
            Severity::Low,
            "GPS simulation reset - back to real GPS mode",
            Some(AlertData::Reset),
        ));
        accepted
    }

    /// Log that a session snapshot was written.
    pub fn record_export(&mut self, record_count: usize) {
        let now = self.clock.now();
        self.push_alert(DetectionAlert::new(
            now,
            Severity::Low,
            "Test data exported successfully",
            Some(AlertData::Export { record_count }),
        ));
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("home", &self.home)
            .field("center", &self.filter.last_center())
            .field("current_location", &self.current_location)
            .field("locations", &self.locations.len())
            .field("alerts", &self.alerts.len())
            .field("simulation", &self.simulation)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::geo;

    const HOME: Coordinate = Coordinate { lat: 0.0, lng: 0.0 };
    const T0: f64 = 1_700_000_000.0;

    fn make_engine(config: EngineConfig) -> (Engine, ManualClock) {
        let clock = ManualClock::new(T0);
        let engine = Engine::new(HOME, config, Arc::new(clock.clone())).unwrap();
        (engine, clock)
    }

    fn north_m(m: f64) -> Coordinate {
        Coordinate {
            lat: (m / geo::EARTH_RADIUS_M).to_degrees(),
            lng: 0.0,
        }
    }

    fn sample_at(clock: &ManualClock, c: Coordinate, accuracy: f64) -> LocationSample {
        LocationSample {
            coordinate: c,
            timestamp: clock.now(),
            accuracy_m: accuracy,
            speed_kmh: None,
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            filter: TrendFilterConfig {
                bbox: Some(BoundingBox {
                    min_lat: 5.0,
                    max_lat: 1.0,
                    min_lng: 0.0,
                    max_lng: 1.0,
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = Engine::new(HOME, config, Arc::new(ManualClock::new(0.0)));
        assert!(matches!(result, Err(GeoTrustError::InvalidConfig(_))));
    }

    #[test]
    fn test_ingest_accepts_and_records() {
        let (mut engine, clock) = make_engine(EngineConfig::default());
        clock.advance(2.0);
        let outcome = engine.ingest(sample_at(&clock, north_m(20.0), 5.0)).unwrap();
        assert!(outcome.center_accepted());
        assert_eq!(engine.center(), north_m(20.0));
        assert_eq!(engine.current_location(), north_m(20.0));
        assert_eq!(engine.locations().len(), 1);
        assert_eq!(engine.samples_ingested, 1);
    }

    #[test]
    fn test_rejected_sample_still_enters_history() {
        let (mut engine, clock) = make_engine(EngineConfig::default());
        clock.advance(1.0);
        let outcome = engine.ingest(sample_at(&clock, north_m(5000.0), 5.0)).unwrap();
        assert!(matches!(outcome.rejection, Some(Rejection::SpeedExceeded { .. })));
        assert_eq!(engine.center(), HOME);
        assert_eq!(engine.current_location(), north_m(5000.0));
        assert_eq!(engine.locations().len(), 1);
        // Rejections are not alerts unless the caller says so
        assert!(engine.alerts().is_empty());

        engine.record_rejection(north_m(5000.0), &outcome.rejection.unwrap());
        assert_eq!(engine.alerts().len(), 1);
        assert_eq!(engine.risk(), RiskLevel::High);
    }

    #[test]
    fn test_invalid_sample_discarded() {
        let (mut engine, clock) = make_engine(EngineConfig::default());
        let mut bad = sample_at(&clock, north_m(1.0), 5.0);
        bad.coordinate.lat = f64::NAN;
        assert!(engine.ingest(bad).is_err());
        bad.coordinate.lat = 0.0;
        bad.accuracy_m = -2.0;
        assert!(engine.ingest(bad).is_err());

        assert_eq!(engine.samples_invalid, 2);
        assert!(engine.locations().is_empty());
        assert_eq!(engine.center(), HOME);
    }

    #[test]
    fn test_tick_logs_alerts_and_raises_risk() {
        let (mut engine, clock) = make_engine(EngineConfig::default());
        engine.ingest(sample_at(&clock, HOME, 5.0)).unwrap();
        assert!(engine.tick().is_empty());

        clock.advance(10.0);
        engine.ingest(sample_at(&clock, north_m(1000.0), 5.0)).unwrap();
        let alerts = engine.tick();
        assert!(alerts.iter().any(|a| a.kind() == "speed_exceeded"));
        assert_eq!(engine.alerts().len(), alerts.len());
        assert_eq!(engine.risk(), RiskLevel::High);

        // A minute later the window has moved on
        clock.advance(60.0);
        assert_eq!(engine.risk(), RiskLevel::Low);
        assert_eq!(engine.ticks, 2);
    }

    #[test]
    fn test_repeated_accuracy_alerts_reach_medium() {
        let (mut engine, clock) = make_engine(EngineConfig::default());
        for _ in 0..4 {
            clock.advance(2.0);
            engine.ingest(sample_at(&clock, HOME, 80.0)).unwrap();
            engine.tick();
        }
        // Ticks 2..4 each emit one accuracy alert
        assert_eq!(engine.risk_summary().medium, 3);
        assert_eq!(engine.risk(), RiskLevel::Medium);
    }

    #[test]
    fn test_alert_log_capacity() {
        let config = EngineConfig {
            alert_capacity: 3,
            ..Default::default()
        };
        let (mut engine, _clock) = make_engine(config);
        for i in 0..10 {
            engine.record_export(i);
        }
        assert_eq!(engine.alerts().len(), 3);
        assert_eq!(engine.alerts_emitted, 10);
        assert_eq!(
            engine.alerts().newest().unwrap().data,
            Some(AlertData::Export { record_count: 9 })
        );
    }

    #[test]
    fn test_clear_alerts_resets_risk() {
        let (mut engine, _clock) = make_engine(EngineConfig::default());
        engine.record_rejection(north_m(1.0), &Rejection::OutsideBbox);
        assert_eq!(engine.risk(), RiskLevel::High);
        engine.clear_alerts();
        assert!(engine.alerts().is_empty());
        assert_eq!(engine.alerts().capacity(), ALERT_CAPACITY);
        assert_eq!(engine.risk(), RiskLevel::Low);
    }

    #[test]
    fn test_simulated_location_and_reset() {
        let (mut engine, clock) = make_engine(EngineConfig::default());
        clock.advance(2.0);
        let fix = PlannedFix {
            offset_secs: 0.0,
            coordinate: north_m(30.0),
            speed_kmh: Some(12.0),
            accuracy_m: 4.0,
        };
        let outcome = engine.apply_simulated_location(&fix).unwrap();
        assert!(outcome.center_accepted());
        assert!(engine.is_simulation_mode());
        assert_eq!(engine.simulation().simulated_location.speed, 12.0);
        assert_eq!(engine.alerts().newest().unwrap().severity, Severity::Low);

        // Speed carried over when the fix leaves it unset
        let fix = PlannedFix {
            speed_kmh: None,
            ..fix
        };
        clock.advance(2.0);
        let outcome = engine.apply_simulated_location(&fix).unwrap();
        assert_eq!(outcome.sample.speed_kmh, Some(12.0));

        clock.advance(2.0);
        assert!(engine.reset_to_real());
        assert!(!engine.is_simulation_mode());
        assert_eq!(engine.current_location(), HOME);
        assert_eq!(engine.center(), HOME);
        assert_eq!(engine.alerts().newest().unwrap().data, Some(AlertData::Reset));
        assert_eq!(engine.risk(), RiskLevel::Low);
    }

    #[test]
    fn test_shared_engine_is_send() {
        fn assert_send<T: Send + Sync>(_: &T) {}
        let (engine, _clock) = make_engine(EngineConfig::default());
        let shared = engine.into_shared();
        assert_send(&shared);
        assert_eq!(shared.lock().unwrap().center(), HOME);
    }
}
