// =====================================================================================
// AUDIT CELL - COMPLIANCE EVENT TRAIL FOR ALERTING AND MESSAGING
// =====================================================================================

pub mod models;
pub mod services;

pub use models::{AuditEntry, AuditEventType, AuditOutcome};
pub use services::{message_body_field, AuditService, AuditSink};
