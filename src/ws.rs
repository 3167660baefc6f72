use crate::startup::AppState;
use crate::tally::TallyService;
use axum::{
    extract::{
        Extension, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub async fn ws_handler(ws: WebSocketUpgrade, Extension(app_state): Extension<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state.service, app_state.shutdown))
}

/// Forwards hub messages to one client until either side goes away.
///
/// Inbound frames are only read to notice the disconnect.
async fn handle_socket(socket: WebSocket, service: TallyService, shutdown: CancellationToken) {
    let mut connection = service.on_subscribe();
    let connection_id = connection.id();
    info!(connection_id = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            outbound = connection.recv() => {
                let Some(text) = outbound else {
                    debug!(connection_id = %connection_id, "Dropped by broadcast hub");
                    break;
                };
                if let Err(e) = sender.send(Message::Text(text.to_string())).await {
                    debug!(connection_id = %connection_id, error = %e, "Send failed");
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection_id = %connection_id, error = %e, "Receive failed");
                        break;
                    }
                }
            }
        }
    }

    service.on_disconnect(connection_id);
    info!(connection_id = %connection_id, "WebSocket disconnected");
}
