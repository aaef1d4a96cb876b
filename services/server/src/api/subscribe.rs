//! Subscribe endpoint: WebSocket upgrade, subscriber lifecycle, and
//! unsubscribe-on-disconnect.

use std::sync::Arc;

use ripple_core::ClientTransport;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures::StreamExt;
use ripple_core::Subscriber;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::api_validation_error;
use crate::api::tenant::TenantId;
use crate::app::AppState;
use crate::transport::WsTransport;

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    pub topic: Option<String>,
}

pub async fn subscribe(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Query(params): Query<SubscribeParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(topic) = params.topic.filter(|topic| !topic.is_empty()) else {
        return api_validation_error("topic query parameter is required").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(state, tenant.0, topic, socket))
}

async fn handle_socket(state: AppState, tenant_id: String, topic: String, socket: WebSocket) {
    let (sink, mut stream) = socket.split();
    let transport = Arc::new(WsTransport::new(sink));
    let subscriber_id = Uuid::new_v4().to_string();

    // The inbox capacity is sampled once here and kept for the lifetime of
    // the subscriber; the manager only adapts future subscribers.
    let buffer_size = state.buffers.buffer_size();
    let subscriber = Arc::new(Subscriber::new(
        subscriber_id.clone(),
        tenant_id.clone(),
        topic.clone(),
        transport.clone(),
        buffer_size,
    ));
    let mut cancelled = subscriber.cancelled();

    if let Err(err) = state
        .manager
        .subscribe(&tenant_id, &topic, Arc::clone(&subscriber))
        .await
    {
        tracing::warn!(
            error = %err,
            tenant_id = %tenant_id,
            topic = %topic,
            "subscribe rejected"
        );
        transport.close().await;
        return;
    }
    tracing::info!(
        subscriber_id = %subscriber_id,
        tenant_id = %tenant_id,
        topic = %topic,
        buffer_size,
        "subscriber connected"
    );

    // Reader half: the server never consumes client data, but draining the
    // stream is what surfaces the peer going away. That fires the
    // subscriber's cancellation, which is also how server shutdown lands.
    let reader_subscriber = Arc::clone(&subscriber);
    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        reader_subscriber.close().await;
    });

    // Park until the subscriber is cancelled, from either direction.
    loop {
        if *cancelled.borrow_and_update() {
            break;
        }
        if cancelled.changed().await.is_err() {
            break;
        }
    }

    if let Err(err) = state
        .manager
        .unsubscribe(&tenant_id, &topic, &subscriber_id)
        .await
    {
        // Already reaped elsewhere (e.g. shutdown); nothing to do.
        tracing::debug!(error = %err, subscriber_id = %subscriber_id, "unsubscribe after disconnect");
    }
    reader.abort();
    tracing::info!(
        subscriber_id = %subscriber_id,
        tenant_id = %tenant_id,
        topic = %topic,
        "subscriber disconnected"
    );
}
