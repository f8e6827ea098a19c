//! WebSocket transport handling: one task pair per connection, with a
//! typed outbound channel feeding the socket.

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::core::events::{ClientEvent, ServerEvent};
use crate::core::EventDispatcher;

/// Handle one WebSocket connection for its whole lifetime.
pub async fn handle_ws_client(ws: WebSocket, dispatcher: Arc<EventDispatcher>) {
    let transport_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    info!("New websocket connection: transport {}", transport_id);

    // Forward outbound events to the socket, serializing as we go.
    // Certain events terminate the connection from the server side.
    tokio::task::spawn(async move {
        while let Some(event) = rx.recv().await {
            let closing = event.closes_connection();
            match serde_json::to_string(&event) {
                Ok(frame) => {
                    if let Err(e) = ws_tx.send(Message::text(frame)).await {
                        debug!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize outbound event: {}", e);
                }
            }
            if closing {
                let _ = ws_tx.send(Message::close()).await;
                break;
            }
        }
    });

    // Pump inbound frames through the dispatcher.
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if !msg.is_text() {
                    continue;
                }
                let text = match msg.to_str() {
                    Ok(text) => text,
                    Err(_) => continue,
                };
                match serde_json::from_str::<ClientEvent>(text) {
                    Ok(event) => {
                        dispatcher.handle_event(&transport_id, &tx, event).await;
                    }
                    Err(e) => {
                        debug!("Unparseable frame from {}: {}", transport_id, e);
                        let _ = tx.send(ServerEvent::Error {
                            code: "bad_request".to_string(),
                            message: "unrecognized event".to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                debug!("WebSocket connection error: {}", e);
                break;
            }
        }
    }

    // Cleanup on disconnect
    dispatcher.handle_disconnect(&transport_id).await;
    info!("Transport {} closed", transport_id);
}
