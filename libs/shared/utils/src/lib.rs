pub mod clock;
pub mod scheduler;
pub mod signature;
pub mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock, TokioClock};
pub use scheduler::{JobInfo, JobScheduler};
