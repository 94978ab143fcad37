//! Telephony media stream endpoint

use super::AppState;
use crate::infrastructure::transport::AxumWebSocketTransport;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};
use tracing::{info, warn};

/// Upgrade the provider's request and hand the stream to the session manager
pub async fn media_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        info!("Telephony media stream connected");
        let transport = AxumWebSocketTransport::from_socket(socket);
        match state.manager.on_inbound_connection(transport).await {
            Ok(handle) => info!("Bridging call {}", handle.call_id()),
            Err(e) => warn!("Media stream rejected: {}", e),
        }
    })
}
