pub mod batch_loader;
pub mod supabase;

pub use batch_loader::{BatchLoader, LoadReport, BATCH_SIZE};
pub use supabase::SupabaseClient;
