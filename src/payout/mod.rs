// Payout core: batching, the per-cycle state machine and its timer
pub mod batcher;
pub mod orchestrator;
pub mod scheduler;

pub use batcher::BatchPolicy;
pub use orchestrator::PayoutOrchestrator;
pub use scheduler::{PayoutScheduleConfig, PayoutScheduler};
