use std::sync::Arc;

use axum::{routing::get, Router};

use alerting_cell::{create_alerting_router, create_webhook_router, AlertingState};
use messaging_cell::{create_messaging_router, NotificationDispatcher};
use schedule_cell::{create_schedule_router, ScheduleManager};
use threshold_cell::{create_threshold_router, ThresholdResolver};

pub struct AppServices {
    pub resolver: Arc<ThresholdResolver>,
    pub dispatcher: NotificationDispatcher,
    pub alerting: AlertingState,
    pub schedules: ScheduleManager,
}

pub fn create_router(services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinical alerting API is running!" }))
        .merge(create_threshold_router(services.resolver))
        .merge(create_messaging_router(services.dispatcher))
        .merge(create_alerting_router(services.alerting.clone()))
        .merge(create_webhook_router(services.alerting))
        .merge(create_schedule_router(services.schedules))
}
