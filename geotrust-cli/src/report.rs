//! Table output shared by the subcommands.

use comfy_table::{Cell, Table};

use geotrust_core::risk::RiskSummary;
use geotrust_core::types::{format_timestamp, DetectionAlert, LocationSample};

pub fn alert_table<'a>(alerts: impl IntoIterator<Item = &'a DetectionAlert>) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Time", "Severity", "Kind", "Message"]);
    for alert in alerts {
        table.add_row(vec![
            Cell::new(format_timestamp(alert.timestamp)),
            Cell::new(alert.severity),
            Cell::new(alert.kind()),
            Cell::new(&alert.message),
        ]);
    }
    table
}

pub fn history_table<'a>(samples: impl IntoIterator<Item = &'a LocationSample>) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Time", "Lat", "Lng", "Accuracy (m)", "Speed (km/h)"]);
    for s in samples {
        table.add_row(vec![
            Cell::new(format_timestamp(s.timestamp)),
            Cell::new(format!("{:.6}", s.coordinate.lat)),
            Cell::new(format!("{:.6}", s.coordinate.lng)),
            Cell::new(format!("{:.1}", s.accuracy_m)),
            Cell::new(
                s.speed_kmh
                    .map(|v| format!("{v:.1}"))
                    .unwrap_or("-".into()),
            ),
        ]);
    }
    table
}

pub fn print_risk(summary: &RiskSummary) {
    println!(
        "Risk: {} ({} high, {} medium, {} low in window)",
        summary.level, summary.high, summary.medium, summary.low
    );
}
