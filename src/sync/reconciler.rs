//! Replays queued mutations against the server once connectivity is back.

use color_eyre::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::reload::Reloader;
use super::target::SyncTarget;
use crate::store::{LocalStore, MutationId, PendingMutation, ScopeId, SyncState};

/// Which local queue a drain reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
  /// `aluno_progress` records not yet synced
  Progress,
  /// Generic submissions kept in `offline_data`
  Outbox,
}

impl QueueKind {
  pub const ALL: [QueueKind; 2] = [QueueKind::Progress, QueueKind::Outbox];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub attempted: usize,
  pub synced: usize,
  pub failed: usize,
  /// Whether server data was reloaded after the pass
  pub reloaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
  /// Another drain for the same scope is in progress; nothing was sent.
  AlreadyDraining,
  Completed(DrainReport),
}

pub struct Reconciler {
  store: Arc<LocalStore>,
  target: Arc<dyn SyncTarget>,
  reloader: Option<Arc<dyn Reloader>>,
  /// Scopes with a drain in progress
  draining: Mutex<HashSet<ScopeId>>,
}

impl Reconciler {
  pub fn new(store: Arc<LocalStore>, target: Arc<dyn SyncTarget>) -> Self {
    Self {
      store,
      target,
      reloader: None,
      draining: Mutex::new(HashSet::new()),
    }
  }

  pub fn with_reloader(mut self, reloader: Arc<dyn Reloader>) -> Self {
    self.reloader = Some(reloader);
    self
  }

  #[cfg(test)]
  pub fn is_draining(&self, scope: &ScopeId) -> bool {
    self
      .draining
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(scope)
  }

  /// Replay every pending mutation of `scope` in the given queues.
  ///
  /// One failing mutation never stops the pass; it stays queued for the next
  /// drain. If anything synced, server data for the scope is reloaded.
  pub async fn drain(&self, scope: &ScopeId, queues: &[QueueKind]) -> Result<DrainOutcome> {
    let Some(_guard) = DrainGuard::acquire(&self.draining, scope) else {
      debug!(scope = %scope, "Drain already in progress");
      return Ok(DrainOutcome::AlreadyDraining);
    };

    let mut report = DrainReport::default();
    for queue in queues {
      for mutation in self.pending(scope, *queue).await? {
        self.replay(&mutation, &mut report).await;
      }
    }

    if report.synced > 0 {
      if let Some(reloader) = &self.reloader {
        match reloader.reload(scope).await {
          Ok(()) => report.reloaded = true,
          Err(e) => warn!(scope = %scope, error = %e, "Failed to reload after sync"),
        }
      }
    }

    if report.attempted > 0 {
      info!(
        scope = %scope,
        attempted = report.attempted,
        synced = report.synced,
        failed = report.failed,
        "Drain finished"
      );
    }
    Ok(DrainOutcome::Completed(report))
  }

  async fn pending(&self, scope: &ScopeId, queue: QueueKind) -> Result<Vec<PendingMutation>> {
    match queue {
      // In-flight records belong to a direct write; crash leftovers are
      // re-queued by `LocalStore::recover_in_flight`.
      QueueKind::Progress => Ok(
        self
          .store
          .get_all_unsynced(scope)
          .await?
          .iter()
          .filter(|record| record.state == SyncState::Pending)
          .map(PendingMutation::from)
          .collect(),
      ),
      QueueKind::Outbox => self.store.pending_submissions(scope).await,
    }
  }

  async fn replay(&self, mutation: &PendingMutation, report: &mut DrainReport) {
    if let MutationId::Progress(id) = mutation.id {
      match self.store.mark_sending(id).await {
        Ok(true) => {}
        Ok(false) => {
          debug!(mutation = %mutation.id, "Mutation claimed elsewhere, skipping");
          return;
        }
        Err(e) => {
          warn!(mutation = %mutation.id, error = %e, "Failed to claim mutation, keeping it queued");
          return;
        }
      }
    }
    report.attempted += 1;

    match self.target.send(mutation).await {
      Ok(()) => {
        report.synced += 1;
        if let Err(e) = self.commit(&mutation.id).await {
          // Left in flight; resent with the same idempotency key after restart
          warn!(mutation = %mutation.id, error = %e, "Server accepted mutation but local commit failed");
        }
      }
      Err(e) => {
        report.failed += 1;
        warn!(mutation = %mutation.id, error = %e, "Replay failed, keeping mutation queued");
        if let MutationId::Progress(id) = mutation.id {
          if let Err(e) = self.store.release(id).await {
            warn!(mutation = %mutation.id, error = %e, "Failed to release mutation");
          }
        }
      }
    }
  }

  async fn commit(&self, id: &MutationId) -> Result<()> {
    match id {
      MutationId::Progress(id) => self.store.mark_synced(*id).await.map(|_| ()),
      MutationId::Outbox(key) => self.store.delete_snapshot(key).await.map(|_| ()),
    }
  }
}

/// Marks a scope as draining for as long as it lives.
struct DrainGuard<'a> {
  draining: &'a Mutex<HashSet<ScopeId>>,
  scope: ScopeId,
}

impl<'a> DrainGuard<'a> {
  fn acquire(draining: &'a Mutex<HashSet<ScopeId>>, scope: &ScopeId) -> Option<Self> {
    let inserted = draining
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(scope.clone());

    inserted.then(|| Self {
      draining,
      scope: scope.clone(),
    })
  }
}

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self
      .draining
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.scope);
  }
}
