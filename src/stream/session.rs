//! One observer's sampling → detection → delivery loop.

use std::fmt::Display;
use std::time::Duration;

use futures::{Sink, SinkExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::detect::DetectionPipeline;
use crate::stream::encode_record;
use crate::stream::registry::Registration;
use crate::telemetry::{TelemetryError, TelemetrySource};

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// Cancelled by peer disconnect, deregistration or shutdown.
    Cancelled,
    /// Writing to the observer failed.
    ObserverGone(String),
    /// The telemetry source failed.
    Telemetry(TelemetryError),
    /// A record could not be encoded.
    Encode(String),
}

/// Owns a telemetry source and an optional pipeline for one observer.
pub struct Session<S> {
    source: S,
    pipeline: Option<DetectionPipeline>,
    interval: Duration,
    delivered: u64,
}

impl<S: TelemetrySource> Session<S> {
    pub fn new(source: S, pipeline: Option<DetectionPipeline>, interval: Duration) -> Self {
        Self {
            source,
            pipeline,
            interval,
            delivered: 0,
        }
    }

    /// Stream records into `sink` until cancelled or a failure ends the
    /// session. The registration is released when this returns.
    pub async fn run<K>(mut self, mut sink: K, mut registration: Registration) -> SessionEnd
    where
        K: Sink<String> + Unpin,
        K::Error: Display,
    {
        let id = registration.id;
        info!(session = %id, detection = self.pipeline.is_some(), "session started");

        let end = self.drive(id, &mut sink, &mut registration).await;
        match &end {
            SessionEnd::Cancelled => info!(session = %id, delivered = self.delivered, "session cancelled"),
            SessionEnd::ObserverGone(e) => {
                info!(session = %id, delivered = self.delivered, error = %e, "observer gone")
            }
            SessionEnd::Telemetry(e) => {
                warn!(session = %id, delivered = self.delivered, error = %e, "telemetry failed, ending session")
            }
            SessionEnd::Encode(e) => {
                warn!(session = %id, error = %e, "record encoding failed, ending session")
            }
        }
        if let Err(e) = sink.close().await {
            debug!(session = %id, error = %e, "closing observer sink failed");
        }
        drop(registration);
        end
    }

    async fn drive<K>(&mut self, id: Uuid, sink: &mut K, registration: &mut Registration) -> SessionEnd
    where
        K: Sink<String> + Unpin,
        K::Error: Display,
    {
        let cancel = registration.cancel.clone();
        loop {
            if cancel.is_cancelled() {
                return SessionEnd::Cancelled;
            }

            // Broadcasts queued since the last sample go out first.
            while let Ok(message) = registration.inbox.try_recv() {
                if let Err(end) = deliver(sink, message, &cancel).await {
                    return end;
                }
            }

            let snapshot = match self.source.collect() {
                Ok(snapshot) => snapshot,
                Err(e) => return SessionEnd::Telemetry(e),
            };

            let detection = match self.pipeline.as_mut() {
                Some(pipeline) => match pipeline.process(&snapshot) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(session = %id, ts = %snapshot.ts, error = %e, "scoring failed, sample inconclusive");
                        None
                    }
                },
                None => None,
            };

            let record = match encode_record(&snapshot, detection.as_ref()) {
                Ok(record) => record,
                Err(e) => return SessionEnd::Encode(e.to_string()),
            };
            if let Err(end) = deliver(sink, record, &cancel).await {
                return end;
            }
            self.delivered += 1;
            if detection.is_some_and(|d| d.alarm) {
                debug!(session = %id, ts = %snapshot.ts, "alarm raised");
            }

            if self.interval.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            let sleep = tokio::time::sleep(self.interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return SessionEnd::Cancelled,
                    Some(message) = registration.inbox.recv() => {
                        if let Err(end) = deliver(sink, message, &cancel).await {
                            return end;
                        }
                    }
                    _ = &mut sleep => break,
                }
            }
        }
    }
}

async fn deliver<K>(
    sink: &mut K,
    message: String,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<(), SessionEnd>
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionEnd::Cancelled),
        sent = sink.send(message) => sent.map_err(|e| SessionEnd::ObserverGone(e.to_string())),
    }
}
