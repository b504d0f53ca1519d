//! Optimistic recording of student progress.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::target::SyncTarget;
use crate::store::{LocalStore, NewProgress, PendingMutation, SyncState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
  /// The server acknowledged the write
  Synced,
  /// Stored locally, waiting for the next drain
  Queued,
  /// Neither the server nor the local store took it
  NotPersisted,
}

/// Writes progress locally first, then straight to the server when online.
///
/// Local store failures are logged and never block the caller.
pub struct ProgressRecorder {
  store: Arc<LocalStore>,
  target: Arc<dyn SyncTarget>,
  online: watch::Receiver<bool>,
}

impl ProgressRecorder {
  pub fn new(
    store: Arc<LocalStore>,
    target: Arc<dyn SyncTarget>,
    online: watch::Receiver<bool>,
  ) -> Self {
    Self {
      store,
      target,
      online,
    }
  }

  pub async fn record(&self, progress: NewProgress) -> RecordOutcome {
    let online = *self.online.borrow();

    let stored = if online {
      self.store.put_progress_sending(&progress).await
    } else {
      self.store.put_progress(&progress).await
    };
    let id = match stored {
      Ok(id) => Some(id),
      Err(e) => {
        warn!(scope = %progress.scope, error = %e, "Failed to persist progress locally");
        None
      }
    };

    if !online {
      debug!(scope = %progress.scope, "Offline, progress queued");
      return match id {
        Some(_) => RecordOutcome::Queued,
        None => RecordOutcome::NotPersisted,
      };
    }

    let record = progress.into_record(id.unwrap_or_default(), SyncState::Sending);
    match self.target.send(&PendingMutation::from(&record)).await {
      Ok(()) => {
        if let Some(id) = id {
          if let Err(e) = self.store.mark_synced(id).await {
            warn!(id, error = %e, "Failed to mark progress synced");
          }
        }
        RecordOutcome::Synced
      }
      Err(e) => {
        warn!(scope = %record.scope, error = %e, "Direct write failed, queueing progress");
        match id {
          Some(id) => {
            if let Err(e) = self.store.release(id).await {
              warn!(id, error = %e, "Failed to queue progress");
            }
            RecordOutcome::Queued
          }
          None => RecordOutcome::NotPersisted,
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::ScopeId;
  use crate::testing::RecordingTarget;

  fn scope() -> ScopeId {
    ScopeId::new("igreja-1")
  }

  #[tokio::test]
  async fn test_offline_progress_is_queued_unsynced() {
    let store = Arc::new(LocalStore::in_memory());
    let target = RecordingTarget::new();
    let (_tx, rx) = watch::channel(false);
    let recorder = ProgressRecorder::new(store.clone(), target.clone(), rx);

    let outcome = recorder
      .record(NewProgress::new(scope(), "c1", "l1", 100))
      .await;
    assert_eq!(outcome, RecordOutcome::Queued);
    assert_eq!(target.attempts(), 0);

    // Visible right away, flagged unsynced
    let records = store.progress_for(&scope()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].synced());
  }

  #[tokio::test]
  async fn test_online_progress_written_directly() {
    let store = Arc::new(LocalStore::in_memory());
    let target = RecordingTarget::new();
    let (_tx, rx) = watch::channel(true);
    let recorder = ProgressRecorder::new(store.clone(), target.clone(), rx);

    let outcome = recorder
      .record(NewProgress::new(scope(), "c1", "l1", 60))
      .await;
    assert_eq!(outcome, RecordOutcome::Synced);
    assert_eq!(target.sent().len(), 1);
    assert!(store.get_all_unsynced(&scope()).await.unwrap().is_empty());
    assert!(store.progress_for(&scope()).await.unwrap()[0].synced());
  }

  #[tokio::test]
  async fn test_online_failure_falls_back_to_queue() {
    let store = Arc::new(LocalStore::in_memory());
    let target = RecordingTarget::new();
    target.set_fail_all(true);
    let (_tx, rx) = watch::channel(true);
    let recorder = ProgressRecorder::new(store.clone(), target, rx);

    let outcome = recorder
      .record(NewProgress::new(scope(), "c1", "l1", 60))
      .await;
    assert_eq!(outcome, RecordOutcome::Queued);
    let unsynced = store.get_all_unsynced(&scope()).await.unwrap();
    assert_eq!(unsynced[0].state, SyncState::Pending);
  }

  #[tokio::test]
  async fn test_store_failure_does_not_block_server_write() {
    // A directory path cannot be opened as a database
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::open(dir.path()));
    let target = RecordingTarget::new();
    let (_tx, rx) = watch::channel(true);
    let recorder = ProgressRecorder::new(store, target.clone(), rx);

    let outcome = recorder
      .record(NewProgress::new(scope(), "c1", "l1", 100))
      .await;
    assert_eq!(outcome, RecordOutcome::Synced);
    assert_eq!(target.sent().len(), 1);
  }
}
