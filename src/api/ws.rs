//! `/ws/metrics`: one streaming session per WebSocket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error};

use super::state::AppState;
use crate::detect::DetectionPipeline;
use crate::stream::Session;

pub async fn metrics_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let registration = state.registry.register();
    let id = registration.id;
    let (sink, mut stream) = socket.split();

    // Watch the read half so a peer close cancels the session promptly.
    let cancel = registration.cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(frame)) => {
                    debug!(session = %id, ?frame, "peer closed socket");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(session = %id, error = %e, "socket read failed");
                    break;
                }
            }
        }
        cancel.cancel();
    });

    let source = match (state.sources)() {
        Ok(source) => source,
        Err(e) => {
            error!(session = %id, error = %e, "failed to open telemetry source");
            reader.abort();
            return;
        }
    };

    let detector = &state.config.detector;
    let pipeline = if detector.enabled {
        match DetectionPipeline::with_default_models(detector) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                error!(session = %id, error = %e, "failed to build detection pipeline");
                reader.abort();
                return;
            }
        }
    } else {
        None
    };

    let sink = sink.with(|text: String| async move { Ok::<_, axum::Error>(Message::Text(text.into())) });
    let session = Session::new(source, pipeline, state.config.server.sample_interval());
    session.run(Box::pin(sink), registration).await;

    reader.abort();
}
