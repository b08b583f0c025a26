//! Simulated GPS source and canned spoofing scenarios.
//!
//! Nothing here sleeps. Scenario plans carry time offsets; the driver
//! (CLI loop or test) decides how those offsets map to real or manual time.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::types::{AlertData, Coordinate, GeoTrustError, LocationSample, Severity};

/// Per-axis random-walk span for the simulated "real" receiver, degrees.
const REAL_GPS_VARIATION_DEG: f64 = 0.0001;
const REAL_GPS_MIN_ACCURACY_M: f64 = 3.0;
const REAL_GPS_ACCURACY_SPAN_M: f64 = 7.0;
const REAL_GPS_MAX_SPEED_KMH: f64 = 60.0;

/// Delay between starting a scenario and logging its descriptive alert.
pub const SCENARIO_ALERT_DELAY_SECS: f64 = 0.1;

// ---------------------------------------------------------------------------
// Simulation state (exported with session snapshots)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedLocation {
    pub lat: f64,
    pub lng: f64,
    pub speed: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    pub is_simulation_mode: bool,
    pub simulated_location: SimulatedLocation,
}

impl SimulationState {
    pub fn new(home: Coordinate) -> Self {
        SimulationState {
            is_simulation_mode: false,
            simulated_location: SimulatedLocation {
                lat: home.lat,
                lng: home.lng,
                speed: 0.0,
                accuracy: 5.0,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Real-GPS random walk
// ---------------------------------------------------------------------------

/// Stand-in for a device receiver: jittery position, plausible accuracy.
#[derive(Debug, Clone)]
pub struct GpsSimulator {
    position: Coordinate,
    rng: StdRng,
}

impl GpsSimulator {
    pub fn new(start: Coordinate, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        GpsSimulator {
            position: start,
            rng,
        }
    }

    pub fn position(&self) -> Coordinate {
        self.position
    }

    pub fn reset(&mut self, position: Coordinate) {
        self.position = position;
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Next jittered fix stamped at `now`.
    pub fn next_fix(&mut self, now: f64) -> LocationSample {
        let dlat = (self.rng.gen::<f64>() - 0.5) * REAL_GPS_VARIATION_DEG;
        let dlng = (self.rng.gen::<f64>() - 0.5) * REAL_GPS_VARIATION_DEG;
        self.position = self.position.offset(dlat, dlng);
        LocationSample {
            coordinate: self.position,
            timestamp: now,
            accuracy_m: REAL_GPS_MIN_ACCURACY_M + self.rng.gen::<f64>() * REAL_GPS_ACCURACY_SPAN_M,
            speed_kmh: Some(self.rng.gen::<f64>() * REAL_GPS_MAX_SPEED_KMH),
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Teleport,
    ImpossibleSpeed,
    SignalJump,
    IndoorOutdoor,
}

/// One simulated fix, `offset_secs` after the scenario starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedFix {
    pub offset_secs: f64,
    pub coordinate: Coordinate,
    /// `None` keeps the current simulated speed.
    pub speed_kmh: Option<f64>,
    pub accuracy_m: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub scenario: Scenario,
    pub fixes: Vec<PlannedFix>,
    pub alert_severity: Severity,
    pub alert_message: &'static str,
}

impl ScenarioPlan {
    pub fn alert_data(&self) -> AlertData {
        AlertData::Scenario {
            scenario: self.scenario.name().to_string(),
        }
    }

    /// Time from start until the last fix is applied.
    pub fn duration_secs(&self) -> f64 {
        self.fixes
            .iter()
            .map(|f| f.offset_secs)
            .fold(SCENARIO_ALERT_DELAY_SECS, f64::max)
    }
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Teleport,
        Scenario::ImpossibleSpeed,
        Scenario::SignalJump,
        Scenario::IndoorOutdoor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Teleport => "teleport",
            Scenario::ImpossibleSpeed => "impossible-speed",
            Scenario::SignalJump => "signal-jump",
            Scenario::IndoorOutdoor => "indoor-outdoor",
        }
    }

    /// Lay out the fixes this scenario injects, starting from `from`.
    pub fn plan<R: Rng>(&self, from: Coordinate, rng: &mut R) -> ScenarioPlan {
        let (fixes, alert_severity, alert_message) = match self {
            Scenario::Teleport => (
                vec![PlannedFix {
                    offset_secs: 0.0,
                    coordinate: from.offset(0.1, 0.1),
                    speed_kmh: Some(0.0),
                    accuracy_m: 3.0,
                }],
                Severity::High,
                "Teleport scenario: Instant location jump of ~15km",
            ),
            Scenario::ImpossibleSpeed => (
                vec![PlannedFix {
                    offset_secs: 0.0,
                    coordinate: from.offset(0.01, 0.01),
                    speed_kmh: Some(500.0),
                    accuracy_m: 2.0,
                }],
                Severity::High,
                "Speed scenario: Vehicle moving at 500 km/h",
            ),
            Scenario::SignalJump => {
                let jump = 0.005;
                let fixes = (0..3)
                    .map(|i| PlannedFix {
                        offset_secs: i as f64,
                        coordinate: from.offset(
                            (rng.gen::<f64>() - 0.5) * jump,
                            (rng.gen::<f64>() - 0.5) * jump,
                        ),
                        speed_kmh: None,
                        accuracy_m: 25.0 + rng.gen::<f64>() * 25.0,
                    })
                    .collect();
                (
                    fixes,
                    Severity::Medium,
                    "Signal jump scenario: Erratic GPS signal with poor accuracy",
                )
            }
            Scenario::IndoorOutdoor => {
                let moved = from.offset(0.001, 0.001);
                (
                    vec![
                        PlannedFix {
                            offset_secs: 0.0,
                            coordinate: moved,
                            speed_kmh: Some(5.0),
                            accuracy_m: 65.0,
                        },
                        PlannedFix {
                            offset_secs: 3.0,
                            coordinate: moved,
                            speed_kmh: Some(5.0),
                            accuracy_m: 3.0,
                        },
                    ],
                    Severity::Low,
                    "Indoor/Outdoor scenario: Accuracy changed from \u{b1}65m to \u{b1}3m",
                )
            }
        };
        ScenarioPlan {
            scenario: *self,
            fixes,
            alert_severity,
            alert_message,
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Scenario {
    type Err = GeoTrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                GeoTrustError::Parse(format!(
                    "unknown scenario {s:?} (expected one of: teleport, impossible-speed, signal-jump, indoor-outdoor)"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo;

    const HOME: Coordinate = Coordinate {
        lat: 23.7771,
        lng: 90.3994,
    };

    #[test]
    fn test_real_gps_stays_plausible() {
        let mut sim = GpsSimulator::new(HOME, Some(7));
        let mut prev = sim.position();
        for i in 0..200 {
            let fix = sim.next_fix(i as f64 * 2.0);
            assert!(fix.validate().is_ok());
            assert!(fix.accuracy_m >= 3.0 && fix.accuracy_m < 10.0);
            let speed = fix.speed_kmh.unwrap();
            assert!((0.0..60.0).contains(&speed));
            // Max per-step jitter is 0.00005 deg per axis, well under 10 m
            assert!(geo::distance(&prev, &fix.coordinate) < 10.0);
            prev = fix.coordinate;
        }
    }

    #[test]
    fn test_seeded_simulator_is_deterministic() {
        let mut a = GpsSimulator::new(HOME, Some(42));
        let mut b = GpsSimulator::new(HOME, Some(42));
        for i in 0..10 {
            assert_eq!(a.next_fix(i as f64), b.next_fix(i as f64));
        }
    }

    #[test]
    fn test_teleport_plan() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = Scenario::Teleport.plan(HOME, &mut rng);
        assert_eq!(plan.fixes.len(), 1);
        assert_eq!(plan.alert_severity, Severity::High);
        let jump = geo::distance_km(&HOME, &plan.fixes[0].coordinate);
        assert!(jump > 10.0 && jump < 20.0, "got {jump} km");
    }

    #[test]
    fn test_signal_jump_plan() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = Scenario::SignalJump.plan(HOME, &mut rng);
        let offsets: Vec<f64> = plan.fixes.iter().map(|f| f.offset_secs).collect();
        assert_eq!(offsets, vec![0.0, 1.0, 2.0]);
        for fix in &plan.fixes {
            assert!(fix.accuracy_m >= 25.0 && fix.accuracy_m < 50.0);
            assert!((fix.coordinate.lat - HOME.lat).abs() <= 0.0025);
            assert!(fix.speed_kmh.is_none());
        }
        assert_eq!(plan.duration_secs(), 2.0);
    }

    #[test]
    fn test_indoor_outdoor_plan() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = Scenario::IndoorOutdoor.plan(HOME, &mut rng);
        assert_eq!(plan.fixes.len(), 2);
        assert_eq!(plan.fixes[0].accuracy_m, 65.0);
        assert_eq!(plan.fixes[1].accuracy_m, 3.0);
        assert_eq!(plan.fixes[1].offset_secs, 3.0);
        assert_eq!(plan.alert_severity, Severity::Low);
    }

    #[test]
    fn test_scenario_names_roundtrip() {
        for sc in Scenario::ALL {
            assert_eq!(sc.name().parse::<Scenario>().unwrap(), sc);
        }
        assert_eq!(" Teleport ".parse::<Scenario>().unwrap(), Scenario::Teleport);
        assert!("warp-drive".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_simulation_state_json_shape() {
        let v = serde_json::to_value(SimulationState::new(HOME)).unwrap();
        assert_eq!(v["isSimulationMode"], false);
        assert_eq!(v["simulatedLocation"]["lat"], 23.7771);
        assert_eq!(v["simulatedLocation"]["accuracy"], 5.0);
    }
}
