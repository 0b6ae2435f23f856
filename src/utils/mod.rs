pub mod filename;
pub mod pacing;
pub mod progress;
pub mod retry;
