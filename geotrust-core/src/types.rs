//! Shared types, error enum, and alert payloads for geotrust-core.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// All errors produced by geotrust-core.
#[derive(Debug, Error)]
pub enum GeoTrustError {
    #[error("invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("invalid sample: {0}")]
    InvalidSample(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GeoTrustError>;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting NaN/infinite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        let c = Coordinate { lat, lng };
        c.validate()?;
        Ok(c)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(GeoTrustError::InvalidCoordinate {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }

    /// Offset by raw degree deltas (used by the simulator).
    pub fn offset(&self, dlat: f64, dlng: f64) -> Coordinate {
        Coordinate {
            lat: self.lat + dlat,
            lng: self.lng + dlng,
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Axis-aligned lat/lng box. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Result<Self> {
        let bbox = BoundingBox {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        let corners = [
            Coordinate { lat: self.min_lat, lng: self.min_lng },
            Coordinate { lat: self.max_lat, lng: self.max_lng },
        ];
        if corners.iter().any(|c| !c.is_valid()) {
            return Err(GeoTrustError::InvalidConfig(format!(
                "bbox edges out of range: {self:?}"
            )));
        }
        if self.min_lat > self.max_lat {
            return Err(GeoTrustError::InvalidConfig(format!(
                "bbox min_lat {} > max_lat {}",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lng > self.max_lng {
            return Err(GeoTrustError::InvalidConfig(format!(
                "bbox min_lng {} > max_lng {}",
                self.min_lng, self.max_lng
            )));
        }
        Ok(())
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        c.lat >= self.min_lat && c.lat <= self.max_lat && c.lng >= self.min_lng && c.lng <= self.max_lng
    }
}

// ---------------------------------------------------------------------------
// Location samples
// ---------------------------------------------------------------------------

/// One position report. Timestamps are seconds on the engine clock
/// (epoch-anchored, see `clock`), serialized as ISO-8601 strings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(with = "iso_timestamp")]
    pub timestamp: f64,
    #[serde(rename = "accuracy")]
    pub accuracy_m: f64,
    #[serde(rename = "speed", default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
}

impl LocationSample {
    pub fn new(
        coordinate: Coordinate,
        timestamp: f64,
        accuracy_m: f64,
        speed_kmh: Option<f64>,
    ) -> Result<Self> {
        let sample = LocationSample {
            coordinate,
            timestamp,
            accuracy_m,
            speed_kmh,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Checks every field; NaN anywhere is rejected so it cannot slip past
    /// the comparison-based gates downstream.
    pub fn validate(&self) -> Result<()> {
        self.coordinate.validate()?;
        if !self.timestamp.is_finite() {
            return Err(GeoTrustError::InvalidSample(format!(
                "non-finite timestamp {}",
                self.timestamp
            )));
        }
        if !self.accuracy_m.is_finite() || self.accuracy_m < 0.0 {
            return Err(GeoTrustError::InvalidSample(format!(
                "accuracy must be >= 0, got {}",
                self.accuracy_m
            )));
        }
        if let Some(speed) = self.speed_kmh {
            if !speed.is_finite() || speed < 0.0 {
                return Err(GeoTrustError::InvalidSample(format!(
                    "speed must be >= 0, got {speed}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Severity / risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Coarse spoofing risk, always derived from the alert log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Typed alert payload. Field names on the wire match exported session files.
///
/// Written tagged with `kind`. Read back from either the tagged form or the
/// untagged payloads of older session files; see [`AlertData::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AlertData {
    SpeedExceeded {
        speed: f64,
        threshold: f64,
    },
    Teleportation {
        distance: f64,
        #[serde(rename = "timeDiff")]
        dt_seconds: f64,
    },
    AccuracyAnomaly {
        accuracy: f64,
    },
    SignalPattern {
        variance: f64,
        #[serde(rename = "avgAccuracy")]
        mean_accuracy: f64,
    },
    /// A center move refused by the trend filter, logged by the caller.
    CenterRejected {
        lat: f64,
        lng: f64,
        reason: String,
    },
    ManualLocation {
        lat: f64,
        lng: f64,
    },
    Scenario {
        scenario: String,
    },
    Reset,
    Export {
        #[serde(rename = "recordCount")]
        record_count: usize,
    },
}

impl AlertData {
    pub fn kind(&self) -> &'static str {
        match self {
            AlertData::SpeedExceeded { .. } => "speed_exceeded",
            AlertData::Teleportation { .. } => "teleportation",
            AlertData::AccuracyAnomaly { .. } => "accuracy_anomaly",
            AlertData::SignalPattern { .. } => "signal_pattern",
            AlertData::CenterRejected { .. } => "center_rejected",
            AlertData::ManualLocation { .. } => "manual_location",
            AlertData::Scenario { .. } => "scenario",
            AlertData::Reset => "reset",
            AlertData::Export { .. } => "export",
        }
    }

    /// Build a payload from its JSON object. Without a `kind` tag the variant
    /// is inferred from the keys present.
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let obj = value.as_object().ok_or("alert data must be an object")?;
        let kind = match obj.get("kind") {
            Some(kind) => kind.as_str().ok_or("alert data `kind` must be a string")?,
            None => infer_alert_kind(obj)?,
        };
        let num = |key: &str| {
            obj.get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("{kind} alert data: missing number `{key}`"))
        };
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("{kind} alert data: missing string `{key}`"))
        };

        Ok(match kind {
            "speedExceeded" => AlertData::SpeedExceeded {
                speed: num("speed")?,
                threshold: num("threshold")?,
            },
            "teleportation" => AlertData::Teleportation {
                distance: num("distance")?,
                dt_seconds: num("timeDiff")?,
            },
            "accuracyAnomaly" => AlertData::AccuracyAnomaly {
                accuracy: num("accuracy")?,
            },
            "signalPattern" => AlertData::SignalPattern {
                variance: num("variance")?,
                mean_accuracy: num("avgAccuracy")?,
            },
            "centerRejected" => AlertData::CenterRejected {
                lat: num("lat")?,
                lng: num("lng")?,
                reason: text("reason")?,
            },
            "manualLocation" => AlertData::ManualLocation {
                lat: num("lat")?,
                lng: num("lng")?,
            },
            "scenario" => AlertData::Scenario {
                scenario: text("scenario")?,
            },
            "reset" => AlertData::Reset,
            "export" => AlertData::Export {
                record_count: obj
                    .get("recordCount")
                    .and_then(Value::as_u64)
                    .ok_or("export alert data: missing count `recordCount`")?
                    as usize,
            },
            other => return Err(format!("unknown alert data kind `{other}`")),
        })
    }
}

/// Variant of an untagged payload, from its distinguishing keys.
fn infer_alert_kind(obj: &Map<String, Value>) -> std::result::Result<&'static str, String> {
    let has = |key: &str| obj.contains_key(key);
    let kind = match obj.get("action").and_then(Value::as_str) {
        Some("reset") => "reset",
        Some("export") => "export",
        Some(other) => return Err(format!("unknown alert action `{other}`")),
        // Speed scenarios also carry `speed`, so `scenario` is checked first
        None if has("scenario") => "scenario",
        None if has("reason") => "centerRejected",
        None if has("threshold") => "speedExceeded",
        None if has("timeDiff") => "teleportation",
        None if has("avgAccuracy") => "signalPattern",
        None if has("accuracy") => "accuracyAnomaly",
        None if has("lat") && has("lng") => "manualLocation",
        None => return Err("unrecognized alert data".into()),
    };
    Ok(kind)
}

impl<'de> Deserialize<'de> for AlertData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        AlertData::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionAlert {
    #[serde(with = "iso_timestamp")]
    pub timestamp: f64,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AlertData>,
}

impl DetectionAlert {
    pub fn new(
        timestamp: f64,
        severity: Severity,
        message: impl Into<String>,
        data: Option<AlertData>,
    ) -> Self {
        DetectionAlert {
            timestamp,
            message: message.into(),
            severity,
            data,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.data.as_ref().map(AlertData::kind).unwrap_or("note")
    }
}

// ---------------------------------------------------------------------------
// Timestamp formatting
// ---------------------------------------------------------------------------

/// Format epoch seconds as an ISO-8601 UTC string with millisecond precision.
pub fn format_timestamp(ts: f64) -> String {
    let millis = (ts * 1000.0).round() as i64;
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        None => format!("{ts}"),
    }
}

/// Parse an RFC 3339 / ISO-8601 string into epoch seconds.
pub fn parse_timestamp(text: &str) -> Result<f64> {
    let dt = chrono::DateTime::parse_from_rfc3339(text.trim())
        .map_err(|e| GeoTrustError::Parse(format!("bad timestamp {text:?}: {e}")))?;
    Ok(dt.timestamp_millis() as f64 / 1000.0)
}

/// Serde adapter: epoch seconds <-> ISO string. Also accepts numbers on input.
pub mod iso_timestamp {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(*ts))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Iso(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Seconds(v) => Ok(v),
            Raw::Iso(s) => super::parse_timestamp(&s).map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
