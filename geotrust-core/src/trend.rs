//! Safe-center gate: decides whether a proposed center may move the view.
//!
//! A candidate must be inside the optional bounding box, reachable from the
//! last accepted center at no more than `max_speed_mps`, and within
//! `MAX_TREND_DEVIATION_M` of the coordinate-wise median of recent accepted
//! centers. The median keeps a single erratic fix from dragging the trend.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geo;
use crate::history::HistoryBuffer;
use crate::types::{BoundingBox, Coordinate, GeoTrustError, Result};

pub const DEFAULT_MAX_SPEED_MPS: f64 = 50.0;
pub const DEFAULT_HISTORY_SIZE: usize = 5;

/// Maximum distance from the median of accepted centers, meters.
pub const MAX_TREND_DEVIATION_M: f64 = 200.0;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendFilterConfig {
    pub max_speed_mps: f64,
    pub bbox: Option<BoundingBox>,
    pub history_size: usize,
}

impl Default for TrendFilterConfig {
    fn default() -> Self {
        TrendFilterConfig {
            max_speed_mps: DEFAULT_MAX_SPEED_MPS,
            bbox: None,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl TrendFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_speed_mps.is_finite() || self.max_speed_mps < 0.0 {
            return Err(GeoTrustError::InvalidConfig(format!(
                "max_speed_mps must be a non-negative number, got {}",
                self.max_speed_mps
            )));
        }
        if self.history_size == 0 {
            return Err(GeoTrustError::InvalidConfig(
                "history_size must be at least 1".into(),
            ));
        }
        if let Some(bbox) = &self.bbox {
            bbox.validate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Why a candidate center was refused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    InvalidCoordinate,
    OutsideBbox,
    SpeedExceeded { speed_mps: f64 },
    TrendDeviation { distance_m: f64 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::InvalidCoordinate => write!(f, "invalid coordinate"),
            Rejection::OutsideBbox => write!(f, "coordinate outside bbox"),
            Rejection::SpeedExceeded { speed_mps } => {
                write!(f, "suspicious speed: {speed_mps:.1} m/s")
            }
            Rejection::TrendDeviation { distance_m } => {
                write!(f, "coordinate deviates from trend ({distance_m:.1} m)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Construction is the one-time initialization: a `TrendFilter` always has a
/// last accepted center.
#[derive(Debug, Clone)]
pub struct TrendFilter {
    config: TrendFilterConfig,
    last_center: Coordinate,
    last_time: f64,
    history: HistoryBuffer<Coordinate>,

    pub accepted: u64,
    pub rejected: u64,
}

impl TrendFilter {
    /// Seed the filter with the initial center at time `now`.
    pub fn new(initial_center: Coordinate, config: TrendFilterConfig, now: f64) -> Result<Self> {
        config.validate()?;
        initial_center.validate()?;
        let mut history = HistoryBuffer::fifo(config.history_size);
        history.append(initial_center);
        Ok(TrendFilter {
            config,
            last_center: initial_center,
            last_time: now,
            history,
            accepted: 0,
            rejected: 0,
        })
    }

    pub fn config(&self) -> &TrendFilterConfig {
        &self.config
    }

    pub fn last_center(&self) -> Coordinate {
        self.last_center
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn history(&self) -> &HistoryBuffer<Coordinate> {
        &self.history
    }

    /// Accept or reject `candidate` at time `now`.
    pub fn propose(&mut self, candidate: Coordinate, now: f64) -> bool {
        self.evaluate(candidate, now).is_ok()
    }

    /// Like `propose`, but reports the reason for a rejection.
    ///
    /// State changes only on `Ok`: center, time and history move together.
    pub fn evaluate(&mut self, candidate: Coordinate, now: f64) -> std::result::Result<(), Rejection> {
        match self.check(&candidate, now) {
            Ok(()) => {
                self.last_center = candidate;
                self.last_time = now;
                self.history.append(candidate);
                self.accepted += 1;
                debug!(lat = candidate.lat, lng = candidate.lng, "center accepted");
                Ok(())
            }
            Err(reason) => {
                self.rejected += 1;
                warn!(lat = candidate.lat, lng = candidate.lng, "center rejected: {reason}");
                Err(reason)
            }
        }
    }

    /// Read-only gate check.
    pub fn check(&self, candidate: &Coordinate, now: f64) -> std::result::Result<(), Rejection> {
        if !candidate.is_valid() {
            return Err(Rejection::InvalidCoordinate);
        }

        // Zero or negative intervals count as one second.
        let mut dt = now - self.last_time;
        if dt <= 0.0 || !dt.is_finite() {
            dt = 1.0;
        }
        let speed_mps = geo::distance(&self.last_center, candidate) / dt;

        if let Some(bbox) = &self.config.bbox {
            if !bbox.contains(candidate) {
                return Err(Rejection::OutsideBbox);
            }
        }

        if speed_mps > self.config.max_speed_mps {
            return Err(Rejection::SpeedExceeded { speed_mps });
        }

        let distance_m = geo::distance(&self.median_center(), candidate);
        if distance_m > MAX_TREND_DEVIATION_M {
            return Err(Rejection::TrendDeviation { distance_m });
        }

        Ok(())
    }

    /// Coordinate-wise median of accepted centers (index `n / 2` after sort).
    pub fn median_center(&self) -> Coordinate {
        median_of(self.history.iter()).unwrap_or(self.last_center)
    }
}

/// Non-interpolated coordinate-wise median: latitudes and longitudes are
/// sorted independently and the element at `n / 2` is taken from each.
pub fn median_of<'a>(points: impl IntoIterator<Item = &'a Coordinate>) -> Option<Coordinate> {
    let (mut lats, mut lngs): (Vec<f64>, Vec<f64>) =
        points.into_iter().map(|p| (p.lat, p.lng)).unzip();
    if lats.is_empty() {
        return None;
    }
    lats.sort_by(f64::total_cmp);
    lngs.sort_by(f64::total_cmp);
    let mid = lats.len() / 2;
    Some(Coordinate {
        lat: lats[mid],
        lng: lngs[mid],
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lng: f64) -> Coordinate {
        Coordinate { lat, lng }
    }

    /// Latitude offset (degrees) that lies `m` meters north of the equator.
    fn north_of_origin(m: f64) -> Coordinate {
        c((m / geo::EARTH_RADIUS_M).to_degrees(), 0.0)
    }

    fn origin_filter(config: TrendFilterConfig) -> TrendFilter {
        TrendFilter::new(c(0.0, 0.0), config, 1000.0).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let f = origin_filter(TrendFilterConfig::default());
        assert_eq!(f.last_center(), c(0.0, 0.0));
        assert_eq!(f.last_time(), 1000.0);
        assert_eq!(f.history().to_vec(), vec![c(0.0, 0.0)]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad_bbox = TrendFilterConfig {
            bbox: Some(BoundingBox {
                min_lat: 10.0,
                max_lat: 5.0,
                min_lng: 0.0,
                max_lng: 1.0,
            }),
            ..Default::default()
        };
        assert!(TrendFilter::new(c(0.0, 0.0), bad_bbox, 0.0).is_err());

        let zero_history = TrendFilterConfig {
            history_size: 0,
            ..Default::default()
        };
        assert!(TrendFilter::new(c(0.0, 0.0), zero_history, 0.0).is_err());

        let nan_speed = TrendFilterConfig {
            max_speed_mps: f64::NAN,
            ..Default::default()
        };
        assert!(TrendFilter::new(c(0.0, 0.0), nan_speed, 0.0).is_err());
    }

    #[test]
    fn test_accept_updates_state() {
        let mut f = origin_filter(TrendFilterConfig::default());
        let target = north_of_origin(30.0);
        assert!(f.propose(target, 1001.0));
        assert_eq!(f.last_center(), target);
        assert_eq!(f.last_time(), 1001.0);
        assert_eq!(f.history().len(), 2);
        assert_eq!(f.accepted, 1);
    }

    #[test]
    fn test_reject_leaves_state_untouched() {
        let mut f = origin_filter(TrendFilterConfig::default());
        let before_center = f.last_center();
        let before_time = f.last_time();
        let before_history = f.history().to_vec();

        // 1 km in one second
        assert!(!f.propose(north_of_origin(1000.0), 1001.0));

        assert_eq!(f.last_center(), before_center);
        assert_eq!(f.last_time(), before_time);
        assert_eq!(f.history().to_vec(), before_history);
        assert_eq!(f.rejected, 1);
    }

    #[test]
    fn test_speed_boundary_is_inclusive() {
        let target = north_of_origin(50.0);
        let dist = geo::distance(&c(0.0, 0.0), &target);

        // Threshold equal to the exact computed speed over 1 s: not greater, accepted.
        let mut f = origin_filter(TrendFilterConfig {
            max_speed_mps: dist,
            ..Default::default()
        });
        assert!(f.propose(target, 1001.0));

        // Default 50 m/s threshold: same hop in 0.999 s is too fast.
        let mut f = origin_filter(TrendFilterConfig::default());
        assert_eq!(
            f.evaluate(target, 1000.999).map_err(|r| matches!(r, Rejection::SpeedExceeded { .. })),
            Err(true)
        );

        // And comfortably under the limit at 1 s.
        let mut f = origin_filter(TrendFilterConfig::default());
        assert!(f.propose(north_of_origin(49.9), 1001.0));

        // 50 m in 1 s at the default 50 m/s, placed a nanometre inside so
        // rounding in the haversine cannot push it over.
        let at_limit = north_of_origin(50.0 - 1e-9);
        let d = geo::distance(&c(0.0, 0.0), &at_limit);
        assert!(d <= DEFAULT_MAX_SPEED_MPS && (d - 50.0).abs() < 1e-6);
        let mut f = origin_filter(TrendFilterConfig::default());
        assert!(f.propose(at_limit, 1001.0));
    }

    #[test]
    fn test_zero_dt_treated_as_one_second() {
        let mut f = origin_filter(TrendFilterConfig::default());
        // Same instant: 40 m over an assumed 1 s is fine
        assert!(f.propose(north_of_origin(40.0), 1000.0));
        // Clock went backwards: still clamped to 1 s
        assert!(f.propose(north_of_origin(70.0), 990.0));
    }

    #[test]
    fn test_bbox_rejection_regardless_of_speed() {
        let mut f = TrendFilter::new(
            c(50.0, 30.0),
            TrendFilterConfig {
                max_speed_mps: 1e9,
                bbox: Some(BoundingBox::new(44.3, 52.3, 22.1, 40.2).unwrap()),
                history_size: 5,
            },
            0.0,
        )
        .unwrap();
        // A hair outside the northern edge, practically no movement needed
        assert_eq!(f.evaluate(c(52.3000001, 30.0), 100.0), Err(Rejection::OutsideBbox));
        assert_eq!(f.evaluate(c(23.7771, 90.3994), 100.0), Err(Rejection::OutsideBbox));
        assert!(f.propose(c(50.0001, 30.0), 100.0));
    }

    #[test]
    fn test_trend_deviation_rejected() {
        let mut f = origin_filter(TrendFilterConfig {
            max_speed_mps: 1e9,
            ..Default::default()
        });
        match f.evaluate(north_of_origin(500.0), 1010.0) {
            Err(Rejection::TrendDeviation { distance_m }) => {
                assert!((distance_m - 500.0).abs() < 0.01)
            }
            other => panic!("expected trend deviation, got {other:?}"),
        }
    }

    #[test]
    fn test_median_ignores_single_outlier() {
        let points = [c(0.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(0.0, 10.0)];
        assert_eq!(median_of(points.iter()), Some(c(0.0, 0.0)));
    }

    #[test]
    fn test_median_even_length_takes_upper_middle_index() {
        // Sorted lats [1,2,3,4]: index 4/2 = 2 -> 3.0
        let points = [c(4.0, 0.0), c(1.0, 0.0), c(3.0, 0.0), c(2.0, 0.0)];
        assert_eq!(median_of(points.iter()).unwrap().lat, 3.0);
        assert!(median_of(std::iter::empty()).is_none());
    }

    #[test]
    fn test_median_is_coordinate_wise() {
        let points = [c(1.0, 30.0), c(3.0, 10.0), c(2.0, 20.0)];
        assert_eq!(median_of(points.iter()), Some(c(2.0, 20.0)));
    }

    #[test]
    fn test_history_bounded_by_config() {
        let mut f = origin_filter(TrendFilterConfig {
            history_size: 3,
            ..Default::default()
        });
        for i in 1..=10 {
            assert!(f.propose(north_of_origin(i as f64 * 10.0), 1000.0 + i as f64));
        }
        assert_eq!(f.history().len(), 3);
        assert_eq!(f.history().newest(), Some(&north_of_origin(100.0)));
    }
}
