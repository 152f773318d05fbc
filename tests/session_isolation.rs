//! Concurrent sessions never share window, threshold or alarm state.

use std::time::Duration;

use futures::channel::mpsc;
use futures::StreamExt;
use pulsewatch::config::DetectorConfig;
use pulsewatch::detect::DetectionPipeline;
use pulsewatch::stream::{Session, SessionEnd, SessionRegistry};
use pulsewatch::telemetry::{MetricSnapshot, TelemetryError, TelemetrySource};
use serde_json::Value;

/// Finite source whose timestamps carry a label so records can be traced
/// back to the session that produced them.
struct Labelled {
    label: &'static str,
    step: f64,
    next: u32,
    limit: u32,
}

impl TelemetrySource for Labelled {
    fn collect(&mut self) -> Result<MetricSnapshot, TelemetryError> {
        if self.next >= self.limit {
            return Err(TelemetryError::Exhausted);
        }
        self.next += 1;
        let n = f64::from(self.next);
        Ok(MetricSnapshot {
            ts: format!("{}-{}", self.label, self.next),
            cpu: (n * self.step) % 37.0,
            mem: 30.0 + (n % 4.0),
            net_in_bps: 100.0 + (n % 5.0) * self.step,
            net_out_bps: 10.0,
            disk_read_bps: n % 2.0,
            disk_write_bps: 0.0,
        })
    }
}

fn pipeline(window: usize) -> DetectionPipeline {
    let cfg = DetectorConfig {
        window,
        baseline: 20,
        sustain: 2,
        sustain_window: 4,
        ..Default::default()
    };
    DetectionPipeline::with_default_models(&cfg).unwrap()
}

async fn run_session(
    registry: &SessionRegistry,
    source: Labelled,
    window: usize,
) -> (SessionEnd, Vec<Value>) {
    let registration = registry.register();
    let (tx, rx) = mpsc::unbounded::<String>();
    let session = Session::new(source, Some(pipeline(window)), Duration::ZERO);
    let end = session.run(tx, registration).await;
    let records = rx
        .map(|text| serde_json::from_str::<Value>(&text).unwrap())
        .collect()
        .await;
    (end, records)
}

#[tokio::test]
async fn test_concurrent_sessions_keep_separate_state() {
    let registry = SessionRegistry::new();
    let a = Labelled { label: "a", step: 3.0, next: 0, limit: 25 };
    let b = Labelled { label: "b", step: 7.0, next: 0, limit: 12 };

    let ((end_a, rec_a), (end_b, rec_b)) =
        tokio::join!(run_session(&registry, a, 3), run_session(&registry, b, 6));

    assert!(matches!(end_a, SessionEnd::Telemetry(TelemetryError::Exhausted)));
    assert!(matches!(end_b, SessionEnd::Telemetry(TelemetryError::Exhausted)));
    assert_eq!(rec_a.len(), 25);
    assert_eq!(rec_b.len(), 12);

    assert!(rec_a.iter().all(|r| r["ts"].as_str().unwrap().starts_with("a-")));
    assert!(rec_b.iter().all(|r| r["ts"].as_str().unwrap().starts_with("b-")));

    // Each session warms up against its own window size.
    let scored = |records: &[Value]| records.iter().filter(|r| r.get("score_ens").is_some()).count();
    assert!(rec_a[..2].iter().all(|r| r.get("score_ens").is_none()));
    assert!(rec_b[..5].iter().all(|r| r.get("score_ens").is_none()));
    assert_eq!(scored(&rec_a), 23);
    assert_eq!(scored(&rec_b), 7);

    // The first scored record of each session is judged against an empty history.
    let first_a = rec_a.iter().find(|r| r.get("score_ens").is_some()).unwrap();
    let first_b = rec_b.iter().find(|r| r.get("score_ens").is_some()).unwrap();
    assert!(first_a["threshold"].is_null());
    assert!(first_b["threshold"].is_null());

    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn test_late_joiner_starts_cold() {
    let registry = SessionRegistry::new();
    let first = Labelled { label: "early", step: 5.0, next: 0, limit: 40 };
    let (_, early) = run_session(&registry, first, 4).await;
    assert!(early.iter().filter(|r| r.get("score_ens").is_some()).count() > 1);

    let second = Labelled { label: "late", step: 5.0, next: 0, limit: 5 };
    let (_, late) = run_session(&registry, second, 4).await;
    assert!(late[..3].iter().all(|r| r.get("score_ens").is_none()));
    assert!(late[3].get("score_ens").is_some());
    assert_eq!(late[3]["threshold"], Value::Null);
}

#[test]
fn test_feeding_one_pipeline_leaves_the_other_untouched() {
    let mut busy = pipeline(3);
    let idle = pipeline(3);
    let mut source = Labelled { label: "x", step: 2.0, next: 0, limit: 15 };

    for _ in 0..15 {
        let snapshot = source.collect().unwrap();
        let _ = busy.process(&snapshot);
    }

    assert_eq!(busy.window_len(), 3);
    assert!(busy.score_history_len() > 0);
    assert!(busy.alarm_history_len() > 0);

    assert_eq!(idle.window_len(), 0);
    assert_eq!(idle.score_history_len(), 0);
    assert_eq!(idle.alarm_history_len(), 0);
    assert!(idle.current_threshold().is_infinite());
}
