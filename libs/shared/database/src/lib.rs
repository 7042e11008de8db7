pub mod memory;
pub mod store;
pub mod supabase;

pub use memory::InMemoryStore;
pub use store::ClinicalStore;
pub use supabase::{SupabaseClient, SupabaseStore};
