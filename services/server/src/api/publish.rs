//! Publish endpoint: JSON events in, throttle check, delivery via the
//! topic manager.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use ripple_core::Message;

use crate::api::tenant::TenantId;
use crate::api::types::{PublishRequest, PublishResponse};
use crate::app::AppState;

pub async fn publish(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<PublishRequest>,
) -> (StatusCode, Json<PublishResponse>) {
    let Some(topic) = body.topic.filter(|topic| !topic.is_empty()) else {
        metrics::counter!("ripple_publish_requests_total", "result" => "invalid").increment(1);
        let err = ripple_core::Error::InvalidRequest("topic is required".to_string());
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    };
    let Some(data) = body.data else {
        metrics::counter!("ripple_publish_requests_total", "result" => "invalid").increment(1);
        let err = ripple_core::Error::InvalidRequest("data is required".to_string());
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    };

    // Advisory backpressure: an armed throttle delays the publisher before
    // the message enters the delivery core.
    if state.throttler.should_throttle() {
        state.throttler.apply_throttle().await;
    }

    let message = Message::new(topic.clone(), tenant.0.clone(), data);
    let message_id = message.id.clone();
    match state.manager.publish(&tenant.0, &topic, message).await {
        Ok(()) => {
            metrics::counter!("ripple_publish_requests_total", "result" => "ok").increment(1);
            (
                StatusCode::OK,
                Json(PublishResponse {
                    success: true,
                    message_id: Some(message_id),
                    error: None,
                }),
            )
        }
        Err(err) => {
            metrics::counter!("ripple_publish_requests_total", "result" => "error").increment(1);
            tracing::warn!(error = %err, topic = %topic, tenant_id = %tenant.0, "publish failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<PublishResponse>) {
    (
        status,
        Json(PublishResponse {
            success: false,
            message_id: None,
            error: Some(message.to_string()),
        }),
    )
}
