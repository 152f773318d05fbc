//! Real-time delivery of detection records to connected observers.

pub mod registry;
pub mod session;

pub use self::registry::{BroadcastReport, Registration, SessionInfo, SessionRegistry};
pub use self::session::{Session, SessionEnd};

use serde::Serialize;

use crate::detect::DetectionResult;
use crate::telemetry::MetricSnapshot;

/// One delivered sample: the snapshot plus detection fields once active.
#[derive(Debug, Serialize)]
pub struct WireRecord<'a> {
    #[serde(flatten)]
    pub snapshot: &'a MetricSnapshot,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub detection: Option<&'a DetectionResult>,
}

/// Encode a flat JSON record. A non-finite threshold is written as `null`.
pub fn encode_record(
    snapshot: &MetricSnapshot,
    detection: Option<&DetectionResult>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireRecord {
        snapshot,
        detection,
    })
}
