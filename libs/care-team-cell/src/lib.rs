pub mod error;
pub mod models;
pub mod services;

pub use error::CareTeamError;
pub use models::{AlertContext, AlertType, RecipientPolicy};
pub use services::{is_available, CareTeamRouter};
