//! Host telemetry snapshots and the sources that produce them.

pub mod host;

pub use self::host::HostSampler;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::FeatureVector;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to read {what}: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("telemetry source exhausted")]
    Exhausted,
}

/// System metrics at one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    /// ISO-8601 timestamp.
    pub ts: String,
    /// CPU usage percent.
    pub cpu: f64,
    /// Memory usage percent.
    pub mem: f64,
    pub net_in_bps: f64,
    pub net_out_bps: f64,
    pub disk_read_bps: f64,
    pub disk_write_bps: f64,
}

impl MetricSnapshot {
    pub fn features(&self) -> FeatureVector {
        vec![
            self.cpu,
            self.mem,
            self.net_in_bps,
            self.net_out_bps,
            self.disk_read_bps,
            self.disk_write_bps,
        ]
    }
}

/// Something that yields one snapshot per call.
pub trait TelemetrySource: Send {
    fn collect(&mut self) -> Result<MetricSnapshot, TelemetryError>;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for Box<T> {
    fn collect(&mut self) -> Result<MetricSnapshot, TelemetryError> {
        (**self).collect()
    }
}

/// Byte rate between two counter readings; counter resets clamp to zero.
pub fn byte_rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    let delta = current as f64 - previous as f64;
    (delta / elapsed_secs).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_rate_clamps_resets() {
        assert_eq!(byte_rate(1_000, 3_000, 2.0), 1_000.0);
        assert_eq!(byte_rate(5_000, 10, 1.0), 0.0);
        assert_eq!(byte_rate(0, 10, 0.0), 0.0);
    }

    #[test]
    fn test_snapshot_wire_names() {
        let s = MetricSnapshot {
            ts: "2024-01-01T00:00:00+00:00".to_string(),
            cpu: 12.5,
            mem: 40.0,
            net_in_bps: 1.0,
            net_out_bps: 2.0,
            disk_read_bps: 3.0,
            disk_write_bps: 4.0,
        };
        let v = serde_json::to_value(&s).unwrap();
        for key in ["ts", "cpu", "mem", "netInBps", "netOutBps", "diskReadBps", "diskWriteBps"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(s.features(), vec![12.5, 40.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
