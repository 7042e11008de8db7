use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::NotificationDispatcher;

pub fn create_messaging_router(dispatcher: NotificationDispatcher) -> Router {
    Router::new()
        .route("/messages/send", post(handlers::send_message))
        .route("/messages/{message_id}/status", get(handlers::get_delivery_status))
        .with_state(dispatcher)
}
