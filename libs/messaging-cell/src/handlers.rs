use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::models::{DeliveryStatusQuery, MessageRequest, MessageResponse};
use crate::services::NotificationDispatcher;

#[axum::debug_handler]
pub async fn send_message(
    State(dispatcher): State<NotificationDispatcher>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let response = dispatcher.send(request).await?;
    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn get_delivery_status(
    State(dispatcher): State<NotificationDispatcher>,
    Path(message_id): Path<String>,
    Query(query): Query<DeliveryStatusQuery>,
) -> Result<Json<Value>, AppError> {
    let status = dispatcher.delivery_status(&query.provider, &message_id).await?;

    Ok(Json(json!({
        "success": true,
        "messageId": message_id,
        "provider": query.provider,
        "status": status,
    })))
}
