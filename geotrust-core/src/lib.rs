//! geotrust-core: location trust gating and GPS spoofing detection.
//!
//! No async, no timers. Just the algorithms plus config and snapshot file
//! helpers. The caller feeds samples and decides when to tick; the
//! `geotrust` CLI is one such caller.

pub mod clock;
pub mod config;
pub mod detector;
pub mod engine;
pub mod export;
pub mod geo;
pub mod history;
pub mod risk;
pub mod simulation;
pub mod trend;
pub mod types;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{DetectorConfig, SpoofingDetector};
pub use engine::{Engine, EngineConfig, IngestOutcome, SharedEngine};
pub use export::{ExportConfig, Snapshot};
pub use history::{AlertLog, Discipline, HistoryBuffer, LocationHistory};
pub use risk::{RiskAggregator, RiskConfig, RiskSummary};
pub use simulation::{GpsSimulator, Scenario, ScenarioPlan, SimulationState};
pub use trend::{Rejection, TrendFilter, TrendFilterConfig};
pub use types::*;
