pub mod clinical;
pub mod error;
pub mod escalation;
pub mod notification;
pub mod schedule;
pub mod thresholds;

pub use clinical::*;
pub use error::AppError;
pub use escalation::EscalationRecord;
pub use notification::DeliveryStatusUpdate;
pub use schedule::*;
pub use thresholds::PatientThresholdOverride;
