//! Services layer for banking-service.

pub mod alerts;
pub mod audit;
pub mod matching;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod scoring;
pub mod sessions;
pub mod sync;
pub mod transactions;

pub use alerts::{AlertEngine, AlertService};
pub use audit::AuditTrail;
pub use matching::{AutoMatcher, MatchSummary};
pub use metrics::{get_metrics, init_metrics};
pub use registry::ConnectionRegistry;
pub use scheduler::SyncScheduler;
pub use sessions::SessionService;
pub use sync::{CycleReport, SyncOutcome, SyncWorker};
pub use transactions::TransactionService;
