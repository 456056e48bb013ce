use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        events::{DisconnectReason, ServerEvent},
        ws::validate_message,
    },
    error::ServiceError,
    services::{
        coordinator::{Credentials, Outbound, RoomHandle},
        session_service::room_for,
    },
    state::SharedState,
};

/// Check the credentials of an upgrade request before switching protocols.
pub async fn authorize(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
) -> Result<RoomHandle, ServiceError> {
    let handle = room_for(state, key)?;
    handle.validate_session(credentials).await?;
    Ok(handle)
}

/// Handle the full lifecycle of one participant's real-time connection.
pub async fn handle_socket(handle: RoomHandle, credentials: Credentials, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

    // Dedicated writer task keeps room events flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(reason) => {
                    let _ = sender
                        .send(Message::Close(Some(close_frame(reason))))
                        .await;
                    break;
                }
            }
        }
    });

    let key = handle.key().to_string();
    let name = credentials.name.clone();

    let connection_id = match handle.attach(credentials, outbound_tx.clone()).await {
        Ok(attachment) => attachment.connection_id,
        Err(err) => {
            warn!(room = %key, user = %name, error = %err, "websocket attach rejected");
            send_event(&outbound_tx, &error_event(&err));
            let reason = match err {
                ServiceError::Auth(_) => DisconnectReason::Auth,
                ServiceError::Permission(_) | ServiceError::NotFound(_) => {
                    DisconnectReason::Permission
                }
                _ => DisconnectReason::Network,
            };
            let _ = outbound_tx.send(Outbound::Close(reason));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match validate_message(text.as_str()) {
                Ok(command) => {
                    if let Err(err) = handle.command(connection_id, command).await {
                        warn!(room = %key, user = %name, error = %err, "room no longer reachable");
                        break;
                    }
                }
                Err(err) => {
                    debug!(room = %key, user = %name, error = %err.message, "invalid frame rejected");
                    send_event(&outbound_tx, &error_event(&ServiceError::from(err)));
                }
            },
            Ok(Message::Close(_)) => {
                info!(room = %key, user = %name, "websocket closed by client");
                break;
            }
            Ok(Message::Binary(_)) => {
                send_event(
                    &outbound_tx,
                    &error_event(&ServiceError::Validation(
                        "binary frames are not supported".into(),
                    )),
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(room = %key, user = %name, error = %err, "websocket error");
                break;
            }
        }
    }

    if let Err(err) = handle.detach(connection_id).await {
        debug!(room = %key, user = %name, error = %err, "detach not delivered");
    }
    finalize(writer_task, outbound_tx).await;
}

fn error_event(err: &ServiceError) -> ServerEvent {
    ServerEvent::Error {
        kind: err.kind().to_string(),
        message: err.to_string(),
    }
}

fn send_event(tx: &mpsc::UnboundedSender<Outbound>, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            let _ = tx.send(Outbound::Text(payload));
        }
        Err(err) => warn!(error = %err, "failed to serialize event"),
    }
}

fn close_frame(reason: DisconnectReason) -> CloseFrame {
    let code = match reason {
        DisconnectReason::Disconnect => close_code::NORMAL,
        DisconnectReason::Auth | DisconnectReason::Permission => close_code::POLICY,
        DisconnectReason::Network => close_code::AWAY,
    };
    CloseFrame {
        code,
        reason: reason.as_str().into(),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Outbound>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_follow_reason() {
        assert_eq!(close_frame(DisconnectReason::Disconnect).code, close_code::NORMAL);
        let auth = close_frame(DisconnectReason::Auth);
        assert_eq!(auth.code, close_code::POLICY);
        assert_eq!(auth.reason.as_str(), "auth");
    }

    #[test]
    fn invalid_frames_become_validation_errors() {
        let err = validate_message("{\"type\":\"launchRockets\"}").unwrap_err();
        let event = error_event(&ServiceError::from(err));
        let ServerEvent::Error { kind, .. } = event else {
            panic!("expected error event");
        };
        assert_eq!(kind, "validation");
    }
}
