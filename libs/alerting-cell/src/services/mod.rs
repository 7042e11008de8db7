pub mod debounce;
pub mod escalation;
pub mod inbound;
pub mod vitals;
pub mod webhooks;

pub use debounce::AlertDebouncer;
pub use escalation::{tier_key, EscalationCoordinator};
pub use inbound::InboundMessageHandler;
pub use vitals::{alert_type_for, VitalsService};
pub use webhooks::WebhookProcessor;
