pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod templates;
pub mod testing;

pub use error::MessagingError;
pub use models::*;
pub use router::create_messaging_router;
pub use services::{
    gateways_from_config, NotificationDispatcher, ProviderGateway, TelnyxGateway, TwilioGateway,
};
pub use templates::TemplateRegistry;
