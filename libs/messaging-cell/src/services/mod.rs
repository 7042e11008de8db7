pub mod dispatcher;
pub mod gateway;
pub mod telnyx;
pub mod twilio;

pub use dispatcher::NotificationDispatcher;
pub use gateway::{gateways_from_config, ProviderGateway};
pub use telnyx::TelnyxGateway;
pub use twilio::TwilioGateway;
