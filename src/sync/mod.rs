pub mod coordinator;
pub mod error;
pub mod events;
pub mod handler;
pub mod history;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod tracker;
pub mod types;
pub mod worker;


pub use coordinator::SyncCoordinator;
pub use error::SyncError;
pub use events::*;
pub use handler::*;
pub use history::ErrorHistory;
pub use queue::TaskQueue;
pub use registry::TaskRegistry;
pub use scheduler::collect_due_requests;
pub use tracker::{ExecutionTracker, RunRecord};
pub use types::*;
pub use worker::{ExecutionOutcome, run_handler};
