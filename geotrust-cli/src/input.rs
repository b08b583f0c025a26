//! Sample file reader for `geotrust analyze`.
//!
//! One sample per line, either a JSON object
//! (`{"lat":..,"lng":..,"timestamp":..,"accuracy":..,"speed":..}`) or the
//! compact form `lat,lng,accuracy[,speed][;timestamp]`. Compact lines without
//! a timestamp get the previous one plus `step` seconds.

use std::io::{self, BufRead};
use std::path::Path;

use geotrust_core::types::{parse_timestamp, Coordinate, GeoTrustError, LocationSample, Result};

/// Spacing for samples without a timestamp, matching the 2 s sampling tick.
pub const DEFAULT_STEP_SECS: f64 = 2.0;

/// Open a file, or stdin for `-`.
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead>> {
    if path.to_str() == Some("-") {
        Ok(Box::new(io::stdin().lock()))
    } else {
        let f = std::fs::File::open(path)?;
        Ok(Box::new(io::BufReader::new(f)))
    }
}

pub struct SampleParser {
    next_timestamp: f64,
    step: f64,
    line_no: usize,
}

impl SampleParser {
    pub fn new(start: f64, step: f64) -> Self {
        SampleParser {
            next_timestamp: start,
            step,
            line_no: 0,
        }
    }

    /// Parse one line. `Ok(None)` for blank lines and `#` comments.
    ///
    /// The sample is not validated here; the engine does that on ingest.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<LocationSample>> {
        self.line_no += 1;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(None);
        }

        let sample = if text.starts_with('{') {
            serde_json::from_str::<LocationSample>(text)
                .map_err(|e| self.error(format!("bad JSON sample: {e}")))?
        } else {
            self.parse_compact(text)?
        };
        self.next_timestamp = sample.timestamp + self.step;
        Ok(Some(sample))
    }

    fn parse_compact(&self, text: &str) -> Result<LocationSample> {
        let (fields, timestamp) = match text.split_once(';') {
            Some((f, t)) => (f, self.parse_time(t.trim())?),
            None => (text, self.next_timestamp),
        };

        let values = fields
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("bad number {:?}", v.trim())))
            })
            .collect::<Result<Vec<f64>>>()?;

        let (lat, lng, accuracy, speed) = match values[..] {
            [lat, lng, accuracy] => (lat, lng, accuracy, None),
            [lat, lng, accuracy, speed] => (lat, lng, accuracy, Some(speed)),
            _ => {
                return Err(self.error(format!(
                    "expected lat,lng,accuracy[,speed], got {} fields",
                    values.len()
                )))
            }
        };

        Ok(LocationSample {
            coordinate: Coordinate { lat, lng },
            timestamp,
            accuracy_m: accuracy,
            speed_kmh: speed,
        })
    }

    /// Epoch seconds or an ISO-8601 string.
    fn parse_time(&self, text: &str) -> Result<f64> {
        match text.parse::<f64>() {
            Ok(ts) => Ok(ts),
            Err(_) => parse_timestamp(text).map_err(|e| self.error(e.to_string())),
        }
    }

    fn error(&self, msg: String) -> GeoTrustError {
        GeoTrustError::Parse(format!("line {}: {msg}", self.line_no))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_compact_lines_auto_increment() {
        let mut parser = SampleParser::new(100.0, DEFAULT_STEP_SECS);
        let a = parser.parse_line("23.7771, 90.3994, 5").unwrap().unwrap();
        let b = parser.parse_line("23.7772,90.3995,6,12.5").unwrap().unwrap();
        assert_eq!(a.timestamp, 100.0);
        assert_eq!(a.speed_kmh, None);
        assert_eq!(b.timestamp, 102.0);
        assert_eq!(b.coordinate.lat, 23.7772);
        assert_eq!(b.accuracy_m, 6.0);
        assert_eq!(b.speed_kmh, Some(12.5));
    }

    #[test]
    fn test_explicit_timestamps() {
        let mut parser = SampleParser::new(0.0, DEFAULT_STEP_SECS);
        let a = parser.parse_line("1,2,3;1700000000").unwrap().unwrap();
        assert_eq!(a.timestamp, 1_700_000_000.0);
        // Next implicit timestamp continues from the explicit one
        let b = parser.parse_line("1,2,3").unwrap().unwrap();
        assert_eq!(b.timestamp, 1_700_000_002.0);
        let c = parser
            .parse_line("1,2,3; 2023-11-14T22:13:20.500Z")
            .unwrap()
            .unwrap();
        assert_eq!(c.timestamp, 1_700_000_000.5);
    }

    #[test]
    fn test_json_line() {
        let mut parser = SampleParser::new(0.0, DEFAULT_STEP_SECS);
        let s = parser
            .parse_line(r#"{"lat": 23.7, "lng": 90.4, "timestamp": "2023-11-14T22:13:20.000Z", "accuracy": 4.5, "speed": 30}"#)
            .unwrap()
            .unwrap();
        assert_eq!(s.coordinate, Coordinate { lat: 23.7, lng: 90.4 });
        assert_eq!(s.timestamp, 1_700_000_000.0);
        assert_eq!(s.accuracy_m, 4.5);
        assert_eq!(s.speed_kmh, Some(30.0));

        let n = parser
            .parse_line(r#"{"lat": 1, "lng": 2, "timestamp": 50.5, "accuracy": 3}"#)
            .unwrap()
            .unwrap();
        assert_eq!(n.timestamp, 50.5);
    }

    #[test]
    fn test_skips_blank_and_comments() {
        let mut parser = SampleParser::new(0.0, DEFAULT_STEP_SECS);
        assert!(parser.parse_line("").unwrap().is_none());
        assert!(parser.parse_line("   ").unwrap().is_none());
        assert!(parser.parse_line("# walk around the block").unwrap().is_none());
    }

    #[test]
    fn test_bad_lines_report_line_number() {
        let mut parser = SampleParser::new(0.0, DEFAULT_STEP_SECS);
        parser.parse_line("# header").unwrap();
        let err = parser.parse_line("1,2").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
        assert!(parser.parse_line("1,north,3").is_err());
        assert!(parser.parse_line("1,2,3;yesterday").is_err());
        assert!(parser.parse_line("{\"lat\": 1}").is_err());
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        let mut parser = SampleParser::new(0.0, DEFAULT_STEP_SECS);
        let s = parser.parse_line("95,0,5").unwrap().unwrap();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_open_input_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# samples").unwrap();
        writeln!(file, "1,2,3").unwrap();
        writeln!(file, "1,2,4").unwrap();

        let reader = open_input(file.path()).unwrap();
        let mut parser = SampleParser::new(10.0, DEFAULT_STEP_SECS);
        let samples: Vec<LocationSample> = reader
            .lines()
            .map(|l| parser.parse_line(&l.unwrap()).unwrap())
            .flatten()
            .collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp, 12.0);
        assert_eq!(samples[1].accuracy_m, 4.0);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_input(&dir.path().join("nope.txt")).is_err());
    }
}
