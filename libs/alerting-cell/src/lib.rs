pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod router;
pub mod services;

pub use error::AlertingError;
pub use models::*;
pub use router::{create_alerting_router, create_webhook_router, AlertingState};
pub use services::{
    AlertDebouncer, EscalationCoordinator, InboundMessageHandler, VitalsService, WebhookProcessor,
};
