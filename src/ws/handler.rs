//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::relay::RelayHandle;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ConnectionId, ServerMsg};

/// Largest inbound frame accepted, enough for a full snapshot
const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let relay = state.relay.clone();
    let input_rate_limit = state.config.input_rate_limit;
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, relay, input_rate_limit))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, relay: RelayHandle, input_rate_limit: u32) {
    let connection = Uuid::new_v4();
    info!(connection = %connection, "New WebSocket connection");

    let Some(outbound_rx) = relay.register(connection).await else {
        error!(connection = %connection, "Relay unavailable, closing socket");
        return;
    };

    let (ws_sink, ws_stream) = socket.split();

    // Writer task: relay queue -> WebSocket
    let writer_handle = tokio::spawn(write_loop(connection, ws_sink, outbound_rx));

    read_loop(connection, ws_stream, &relay, input_rate_limit).await;

    relay.unregister(connection).await;
    writer_handle.abort();

    info!(connection = %connection, "WebSocket connection closed");
}

async fn write_loop(
    connection: ConnectionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(connection = %connection, error = %e, "WebSocket send failed");
            break;
        }
    }
    let _ = ws_sink.close().await;
}

/// Reader loop: WebSocket -> relay
async fn read_loop(
    connection: ConnectionId,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    relay: &RelayHandle,
    input_rate_limit: u32,
) {
    let rate_limiter = ConnectionRateLimiter::new(input_rate_limit);

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg) => {
                    if msg.is_gameplay_delta() && !rate_limiter.check_input() {
                        debug!(connection = %connection, kind = msg.kind(), "Rate limited gameplay message");
                        continue;
                    }
                    if !relay.submit(connection, msg).await {
                        debug!(connection = %connection, "Relay input closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(connection = %connection, error = %e, "Failed to parse client message");
                    relay.reject(connection, e.to_string()).await;
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(connection = %connection, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection = %connection, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection = %connection, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
