pub mod evaluate;
pub mod record;
pub mod runner;

// Re-export common types
pub use evaluate::{Outcome, RunResult};
pub use record::{JsonFileStore, PageRecord, RecordStore};
pub use runner::{PollRunner, RunSummary};
