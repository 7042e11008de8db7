pub mod audit;

pub use audit::{message_body_field, AuditService, AuditSink};
