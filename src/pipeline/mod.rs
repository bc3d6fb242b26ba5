//! Pipeline stages and the pass driver.
//!
//! - `Reconciler`: classify a fetched set and bulk-apply the mutations
//! - `ExpirySweeper`: delete records past their TTL
//! - `SyncPipeline`: one full pass, plus the scheduled loop around it

pub mod reconcile;
pub mod scheduler;
pub mod sweep;
pub mod sync;

pub use reconcile::{Classification, Reconciler, classify};
pub use scheduler::run_scheduled;
pub use sweep::ExpirySweeper;
pub use sync::SyncPipeline;
