pub mod cancel;
pub mod errors;
pub mod ledger;
pub mod model;
pub mod sweep;

pub use cancel::{AccessPolicy, CancelReceipt, CancelRequest, CancellationGate};
pub use errors::JobError;
pub use ledger::{MemoryRetryLedger, RetryLedger};
pub use model::{BuildSpec, JobRecord, JobState};
pub use sweep::{ReconciliationSweep, SweepConfig, SweepReport};
