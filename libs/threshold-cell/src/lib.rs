pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::ThresholdError;
pub use models::*;
pub use router::create_threshold_router;
pub use services::ThresholdResolver;
