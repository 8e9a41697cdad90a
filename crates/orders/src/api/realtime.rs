//! `GET /realtime` WebSocket endpoint
//!
//! A socket joins its owner's user channel, plus the admin channel when
//! `?admin=true` and the caller is an admin. Events go out as JSON text
//! frames; a subscriber that falls behind gets a `resync` frame in place of
//! the dropped events. Anything the client sends is ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::auth::{admin_required, AuthUser, Rejection};
use crate::api::OrdersApiState;
use crate::realtime::{Channel, Subscription};

#[derive(Debug, Default, Deserialize)]
pub struct RealtimeParams {
    #[serde(default)]
    pub admin: bool,
}

pub async fn realtime_socket(
    State(state): State<Arc<OrdersApiState>>,
    AuthUser(identity): AuthUser,
    Query(params): Query<RealtimeParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, Rejection> {
    let mut channels = vec![Channel::User(identity.user_id.clone())];
    if params.admin {
        if !state.auth.is_admin(&identity.user_id) {
            return Err(admin_required());
        }
        channels.push(Channel::Admin);
    }

    let subscription = state.hub.subscribe(&identity.user_id, &channels);
    let shutdown = state.shutdown.child_token();
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, subscription, shutdown)))
}

async fn serve_socket(socket: WebSocket, mut subscription: Subscription, shutdown: CancellationToken) {
    let conn_id = subscription.id();
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(conn_id, channels = ?subscription.channels(), "Realtime socket open");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            item = subscription.recv() => match item {
                Some(item) => {
                    if let Err(e) = sender.send(Message::Text(item.to_frame())).await {
                        tracing::debug!(conn_id, error = %e, "Realtime send failed");
                        break;
                    }
                }
                None => break,
            },

            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id, error = %e, "Realtime socket error");
                    break;
                }
            },
        }
    }

    tracing::debug!(conn_id, "Realtime socket closed");
}
