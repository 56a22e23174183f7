// SPDX-License-Identifier: Apache-2.0
//! Realtime stream framing (spec §6 "Realtime stream framing"): the
//! bidirectional WebSocket transport and the unidirectional SSE transport,
//! both backed by one [`theatreos_realtime::RealtimeHub`] subscription.
//!
//! Each connection splits its socket and spawns a forwarder task that
//! drains a [`theatreos_realtime::Subscriber`] into the transport.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::{self, Stream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use theatreos_realtime::{RealtimeHub, Subscriber, SubscriberId, Subscription};
use theatreos_storage::Storage;
use theatreos_types::{Event as DomainEvent, StageId, TheatreId, UserId};
use tracing::{info, warn};

use crate::state::AppState;

/// Query parameters accepted by both stream endpoints. Authentication is a
/// named external collaborator (spec §1); the transport layer here only
/// needs the already-authenticated caller's `user_id` (spec §4.2 "the
/// Kernel only needs 'user id'").
#[derive(Debug, Deserialize, Default)]
pub struct StreamParams {
    user_id: Option<UserId>,
    theatre_id: Option<TheatreId>,
    #[serde(default)]
    stage_ids: Option<String>,
}

impl StreamParams {
    fn into_subscription(self) -> Subscription {
        let stage_ids = self
            .stage_ids
            .map(|raw| {
                raw.split(',')
                    .filter(|s| !s.is_empty())
                    .map(StageId::from)
                    .collect::<HashSet<_>>()
            })
            .unwrap_or_default();
        Subscription {
            user_id: self.user_id,
            theatre_id: self.theatre_id,
            stage_ids,
        }
    }
}

/// Wraps a [`Subscriber`] so the hub's registry entry is dropped with it.
/// `stream::unfold` only ever drops its state when the output stream
/// itself is dropped (client disconnect), so this is the SSE path's only
/// hook for calling [`RealtimeHub::unsubscribe`] (the WS path calls it
/// explicitly once its read loop ends).
struct UnsubscribeOnDrop {
    id: SubscriberId,
    hub: RealtimeHub,
    subscriber: Subscriber,
}

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let id = self.id;
        tokio::spawn(async move {
            hub.unsubscribe(id).await;
        });
    }
}

fn event_kind_str(event: &DomainEvent) -> String {
    serde_json::to_value(event.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// `GET /v1/stream/sse`: server-push framing, `event: <kind>\ndata:
/// <json>\nid: <event_id>\n\n` per event (spec §6), with a `KeepAlive` that
/// emits a comment frame if no real event arrives within 30s (spec §4.9
/// "MUST emit heartbeats at <=30s idle"), independent of the hub's own
/// heartbeat event.
pub async fn sse_handler<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<StreamParams>,
) -> impl IntoResponse {
    let subscriber = state.realtime.subscribe(params.into_subscription()).await;
    let guarded = UnsubscribeOnDrop {
        id: subscriber.id(),
        hub: state.realtime.clone(),
        subscriber,
    };

    let stream = stream::unfold(guarded, |mut guarded| async move {
        let event = guarded.subscriber.recv().await;
        Some((event, guarded))
    });

    Sse::new(stream.map(|event: DomainEvent| {
        let kind = event_kind_str(&event);
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, std::convert::Infallible>(
            SseEvent::default()
                .event(kind)
                .id(event.event_id.as_str())
                .data(data),
        )
    }))
    .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(30)))
}

/// `GET /v1/stream/ws`: bidirectional framing. The client may send
/// `{"action":"subscribe_stage","stage_id":"..."}`,
/// `{"action":"unsubscribe_stage","stage_id":"..."}`, or
/// `{"action":"ping"}` (spec §6); every hub event is forwarded as a JSON
/// text frame.
pub async fn ws_handler<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<StreamParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientAction {
    SubscribeStage { stage_id: StageId },
    UnsubscribeStage { stage_id: StageId },
    Ping,
}

async fn handle_socket<S: Storage>(socket: WebSocket, state: Arc<AppState<S>>, params: StreamParams) {
    let mut subscriber = state.realtime.subscribe(params.into_subscription()).await;
    let sub_id = subscriber.id();
    let hub = state.realtime.clone();

    let (mut ws_tx, mut ws_rx) = socket.split();

    let forward = tokio::spawn(async move {
        loop {
            let event = subscriber.recv().await;
            let payload = serde_json::json!({
                "kind": event_kind_str(&event),
                "event": event,
            });
            let text = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientAction>(&text) {
                Ok(ClientAction::SubscribeStage { stage_id }) => {
                    hub.subscribe_stage(sub_id, stage_id).await;
                }
                Ok(ClientAction::UnsubscribeStage { stage_id }) => {
                    hub.unsubscribe_stage(sub_id, &stage_id).await;
                }
                Ok(ClientAction::Ping) => {}
                Err(err) => {
                    warn!(?err, "ignoring malformed stream action");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    forward.abort();
    hub.unsubscribe(sub_id).await;
    info!("stream connection closed");
}
