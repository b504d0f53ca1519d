//! Offline mutation replay.
//!
//! Progress is written locally first ([`ProgressRecorder`]); whatever the
//! server has not acknowledged is replayed later by the [`Reconciler`].

mod reconciler;
mod recorder;
mod reload;
mod target;

pub use reconciler::{DrainOutcome, DrainReport, QueueKind, Reconciler};
pub use recorder::{ProgressRecorder, RecordOutcome};
pub use reload::{Reloader, RouterReloader};
pub use target::{RestSyncTarget, SyncTarget};
