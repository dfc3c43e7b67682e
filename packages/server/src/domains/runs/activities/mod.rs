pub mod abort_run;
pub mod bulk_abort;
pub mod create_run;
pub mod merge_enrichment;
pub mod reconcile;

pub use abort_run::ABORTED_BY_USER;
pub use bulk_abort::BulkAbortResult;
pub use create_run::{CreateRunRequest, DISPATCH_FAILED_PREFIX};
pub use reconcile::{reconcile_run, ReconcileOutcome, ReconcilerConfig, TIMEOUT_ERROR_PREFIX};
