pub mod router;

pub use router::{is_available, CareTeamRouter};
