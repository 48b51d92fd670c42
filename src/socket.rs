//! Websocket status channel.
//!
//! Each client receives the armed flag and door status on connect, after
//! every `{"message":"ping"}`, and whenever either changes. Clients arm or
//! disarm monitoring with `{"armed": true|false}`.

use crate::error::{AlarmError, Result};
use crate::monitor::{Monitor, StatusEvent};
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

/// Largest client message accepted before the connection is dropped.
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// Request sent by a status client.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ClientMessage {
    Arm { armed: bool },
    Event { message: String },
}

/// Accept status clients until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, monitor: Arc<Monitor>, shutdown: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!("[Socket] Listening on ws://{}", addr);
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("[Socket] Listener stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let monitor = monitor.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, monitor, shutdown).await {
                            debug!("[Socket] Connection {} ended: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("[Socket] Accept failed: {}", e),
            },
        }
    }
}

/// Frames and messages above [`MAX_MESSAGE_SIZE`] fail the read and end
/// the connection, whatever their opcode.
fn connection_config() -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(MAX_MESSAGE_SIZE))
        .max_frame_size(Some(MAX_MESSAGE_SIZE))
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    monitor: Arc<Monitor>,
    shutdown: CancellationToken,
) -> Result<()> {
    let ws_stream =
        tokio_tungstenite::accept_async_with_config(stream, Some(connection_config())).await?;
    info!("[Socket] New websocket connection from {}", peer);

    let (mut write, mut read) = ws_stream.split();
    let mut events = monitor.subscribe();
    send_state(&mut write, &monitor).await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let text_str: &str = &text;
                    match serde_json::from_str::<ClientMessage>(text_str) {
                        Ok(ClientMessage::Arm { armed }) => {
                            // The armed event reaches this client through the subscription.
                            if let Err(e) = monitor.set_armed(armed) {
                                error!("[Socket] Failed to set armed status: {}", e);
                            }
                        }
                        Ok(ClientMessage::Event { message }) if message == "ping" => {
                            send_state(&mut write, &monitor).await?;
                        }
                        Ok(ClientMessage::Event { message }) => {
                            debug!("[Socket] recv from {}: {}", peer, message);
                        }
                        Err(e) => {
                            warn!("[Socket] Error unmarshalling json from {}: {}", peer, e);
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(tungstenite::Error::Capacity(e))) => {
                    warn!("[Socket] Dropping {}: {}", peer, e);
                    return Err(AlarmError::SocketError(e.to_string()));
                }
                Some(Err(e)) => return Err(e.into()),
            },
            event = events.recv() => match event {
                Ok(event) => send_event(&mut write, event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("[Socket] {} missed {} events, resending state", peer, skipped);
                    send_state(&mut write, &monitor).await?;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("[Socket] Connection from {} closed", peer);
    Ok(())
}

async fn send_state<S>(sink: &mut S, monitor: &Monitor) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let state = monitor.snapshot();
    send_event(sink, StatusEvent::Armed(state.armed)).await?;
    send_event(sink, StatusEvent::Status(state.last_known_status)).await
}

async fn send_event<S>(sink: &mut S, event: StatusEvent) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let payload = serde_json::to_string(&event)?;
    sink.send(Message::Text(payload.into()))
        .await
        .map_err(|e| AlarmError::SocketError(e.to_string()))
}
