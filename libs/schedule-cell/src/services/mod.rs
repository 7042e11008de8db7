pub mod manager;
pub mod timing;

pub use manager::ScheduleManager;
pub use timing::{next_occurrence, QuietWindow, Recurrence};
