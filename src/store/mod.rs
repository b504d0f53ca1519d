//! Local durable store for offline student activity.
//!
//! Two logical stores live in one SQLite database:
//! - `aluno_progress`: lesson progress records with an auto-increment key and a sync flag
//! - `offline_data`: snapshots (and queued submissions) under explicit string keys
//!
//! The connection is opened lazily on first use; concurrent first callers share a
//! single initialization.

mod models;
pub mod schema;

pub use models::{
  MutationId, NewProgress, PendingMutation, ProgressRecord, ResourceKind, ScopeId, Snapshot,
  Submission, SyncState,
};

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Key prefix of queued submissions inside `offline_data`.
const OUTBOX_PREFIX: &str = "outbox:";

enum Location {
  File(PathBuf),
  Memory,
}

pub struct LocalStore {
  location: Location,
  conn: OnceCell<Mutex<Connection>>,
  outbox_seq: AtomicU64,
}

impl LocalStore {
  /// Store backed by the database file at `path`. Nothing is opened until first use.
  pub fn open(path: impl Into<PathBuf>) -> Self {
    Self::with_location(Location::File(path.into()))
  }

  pub fn in_memory() -> Self {
    Self::with_location(Location::Memory)
  }

  fn with_location(location: Location) -> Self {
    Self {
      location,
      conn: OnceCell::new(),
      outbox_seq: AtomicU64::new(0),
    }
  }

  async fn conn(&self) -> Result<&Mutex<Connection>> {
    self
      .conn
      .get_or_try_init(|| async {
        let conn = self.connect()?;
        migrate(&conn)?;
        Ok::<_, color_eyre::Report>(Mutex::new(conn))
      })
      .await
  }

  fn connect(&self) -> Result<Connection> {
    match &self.location {
      Location::File(path) => {
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
        }
        debug!(path = %path.display(), "Opening local store");
        Connection::open(path)
          .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))
      }
      Location::Memory => Connection::open_in_memory()
        .map_err(|e| eyre!("Failed to open in-memory store: {}", e)),
    }
  }

  async fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    let conn = self.conn().await?;
    let conn = conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    f(&conn)
  }

  // ==========================================================================
  // aluno_progress
  // ==========================================================================

  /// Insert a progress record as pending. Returns its auto-increment id.
  pub async fn put_progress(&self, progress: &NewProgress) -> Result<i64> {
    self.insert_progress(progress, false).await
  }

  /// Insert a progress record already in flight, for a write about to be sent
  /// directly. Drains skip it until it is released.
  pub async fn put_progress_sending(&self, progress: &NewProgress) -> Result<i64> {
    self.insert_progress(progress, true).await
  }

  async fn insert_progress(&self, progress: &NewProgress, sending: bool) -> Result<i64> {
    self
      .with_conn(|conn| {
        conn
          .execute(
            "INSERT INTO aluno_progress (igreja_id, curso_id, licao_id, progresso, concluido_em, timestamp, synced, sending)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
            params![
              progress.scope.as_str(),
              progress.course_id,
              progress.lesson_id,
              progress.progress,
              progress.completed_at.map(format_ts),
              format_ts(progress.created_at),
              sending,
            ],
          )
          .map_err(|e| eyre!("Failed to store progress: {}", e))?;
        Ok(conn.last_insert_rowid())
      })
      .await
  }

  /// Unsynced records of a scope (pending and in-flight), in insertion order.
  pub async fn get_all_unsynced(&self, scope: &ScopeId) -> Result<Vec<ProgressRecord>> {
    self
      .query_progress(
        "SELECT id, igreja_id, curso_id, licao_id, progresso, concluido_em, timestamp, synced, sending
         FROM aluno_progress WHERE igreja_id = ? AND synced = 0 ORDER BY id",
        scope,
      )
      .await
  }

  /// Every record of a scope, synced or not.
  pub async fn progress_for(&self, scope: &ScopeId) -> Result<Vec<ProgressRecord>> {
    self
      .query_progress(
        "SELECT id, igreja_id, curso_id, licao_id, progresso, concluido_em, timestamp, synced, sending
         FROM aluno_progress WHERE igreja_id = ? ORDER BY id",
        scope,
      )
      .await
  }

  async fn query_progress(&self, sql: &str, scope: &ScopeId) -> Result<Vec<ProgressRecord>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn
          .prepare(sql)
          .map_err(|e| eyre!("Failed to prepare progress query: {}", e))?;

        let rows = stmt
          .query_map(params![scope.as_str()], ProgressRow::from_row)
          .map_err(|e| eyre!("Failed to query progress: {}", e))?
          .collect::<rusqlite::Result<Vec<_>>>()
          .map_err(|e| eyre!("Failed to read progress row: {}", e))?;

        rows.into_iter().map(ProgressRow::into_record).collect()
      })
      .await
  }

  #[cfg(test)]
  pub async fn get_progress(&self, id: i64) -> Result<Option<ProgressRecord>> {
    self
      .with_conn(|conn| {
        let row = conn
          .query_row(
            "SELECT id, igreja_id, curso_id, licao_id, progresso, concluido_em, timestamp, synced, sending
             FROM aluno_progress WHERE id = ?",
            params![id],
            ProgressRow::from_row,
          )
          .optional()
          .map_err(|e| eyre!("Failed to query progress {}: {}", id, e))?;

        row.map(ProgressRow::into_record).transpose()
      })
      .await
  }

  /// Claim a pending record for its server write. Returns false when the
  /// record is already synced or another writer holds it.
  pub async fn mark_sending(&self, id: i64) -> Result<bool> {
    self
      .update_progress(
        "UPDATE aluno_progress SET sending = 1 WHERE id = ? AND synced = 0 AND sending = 0",
        id,
      )
      .await
  }

  pub async fn mark_synced(&self, id: i64) -> Result<bool> {
    self
      .update_progress("UPDATE aluno_progress SET synced = 1, sending = 0 WHERE id = ?", id)
      .await
  }

  /// Return an in-flight record to the pending queue.
  pub async fn release(&self, id: i64) -> Result<bool> {
    self
      .update_progress("UPDATE aluno_progress SET sending = 0 WHERE id = ? AND synced = 0", id)
      .await
  }

  async fn update_progress(&self, sql: &str, id: i64) -> Result<bool> {
    self
      .with_conn(|conn| {
        let changed = conn
          .execute(sql, params![id])
          .map_err(|e| eyre!("Failed to update progress {}: {}", id, e))?;
        Ok(changed > 0)
      })
      .await
  }

  /// Re-queue records left in flight by an interrupted drain. Returns how many.
  pub async fn recover_in_flight(&self) -> Result<usize> {
    let recovered = self
      .with_conn(|conn| {
        conn
          .execute(
            "UPDATE aluno_progress SET sending = 0 WHERE sending = 1 AND synced = 0",
            [],
          )
          .map_err(|e| eyre!("Failed to recover in-flight progress: {}", e))
      })
      .await?;

    if recovered > 0 {
      info!(count = recovered, "Re-queued in-flight progress records");
    }
    Ok(recovered)
  }

  // ==========================================================================
  // offline_data
  // ==========================================================================

  /// Store a snapshot under its key, overwriting an older one.
  ///
  /// Returns false when the stored snapshot is newer than `snapshot`.
  pub async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
    let data = serde_json::to_string(&snapshot.data)
      .map_err(|e| eyre!("Failed to serialize snapshot {}: {}", snapshot.key, e))?;

    self
      .with_conn(|conn| {
        let changed = conn
          .execute(
            "INSERT INTO offline_data (key, data, igreja_id, fetched_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               data = excluded.data,
               igreja_id = excluded.igreja_id,
               fetched_at = excluded.fetched_at
             WHERE excluded.fetched_at >= offline_data.fetched_at",
            params![
              snapshot.key,
              data,
              snapshot.scope.as_str(),
              format_ts(snapshot.fetched_at)
            ],
          )
          .map_err(|e| eyre!("Failed to store snapshot {}: {}", snapshot.key, e))?;
        Ok(changed > 0)
      })
      .await
  }

  pub async fn get_snapshot(&self, key: &str) -> Result<Option<Snapshot>> {
    self
      .with_conn(|conn| {
        let row = conn
          .query_row(
            "SELECT key, data, igreja_id, fetched_at FROM offline_data WHERE key = ?",
            params![key],
            SnapshotRow::from_row,
          )
          .optional()
          .map_err(|e| eyre!("Failed to query snapshot {}: {}", key, e))?;

        row.map(SnapshotRow::into_snapshot).transpose()
      })
      .await
  }

  /// Snapshots of a scope (queued submissions excluded).
  pub async fn get_cached(&self, scope: &ScopeId) -> Result<Vec<Snapshot>> {
    self
      .query_snapshots(
        "SELECT key, data, igreja_id, fetched_at FROM offline_data
         WHERE igreja_id = ? AND key NOT LIKE 'outbox:%' ORDER BY key",
        scope,
      )
      .await
  }

  pub async fn delete_snapshot(&self, key: &str) -> Result<bool> {
    self
      .with_conn(|conn| {
        let changed = conn
          .execute("DELETE FROM offline_data WHERE key = ?", params![key])
          .map_err(|e| eyre!("Failed to delete snapshot {}: {}", key, e))?;
        Ok(changed > 0)
      })
      .await
  }

  async fn query_snapshots(&self, sql: &str, scope: &ScopeId) -> Result<Vec<Snapshot>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn
          .prepare(sql)
          .map_err(|e| eyre!("Failed to prepare snapshot query: {}", e))?;

        let rows = stmt
          .query_map(params![scope.as_str()], SnapshotRow::from_row)
          .map_err(|e| eyre!("Failed to query snapshots: {}", e))?
          .collect::<rusqlite::Result<Vec<_>>>()
          .map_err(|e| eyre!("Failed to read snapshot row: {}", e))?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
      })
      .await
  }

  // ==========================================================================
  // Outbox (generic submissions, kept in offline_data)
  // ==========================================================================

  /// Queue a submission for the next background sync. Returns its key.
  pub async fn enqueue_submission(&self, scope: &ScopeId, submission: &Submission) -> Result<String> {
    let now = Utc::now();
    let seq = self.outbox_seq.fetch_add(1, Ordering::SeqCst);
    let key = format!("{}{:016}-{:06}", OUTBOX_PREFIX, now.timestamp_micros(), seq);

    let data = serde_json::to_value(submission)
      .map_err(|e| eyre!("Failed to serialize submission: {}", e))?;
    self
      .put_snapshot(&Snapshot {
        key: key.clone(),
        scope: scope.clone(),
        data,
        fetched_at: now,
      })
      .await?;

    Ok(key)
  }

  /// Queued submissions of a scope, oldest first.
  pub async fn pending_submissions(&self, scope: &ScopeId) -> Result<Vec<PendingMutation>> {
    let rows = self
      .query_snapshots(
        "SELECT key, data, igreja_id, fetched_at FROM offline_data
         WHERE igreja_id = ? AND key LIKE 'outbox:%' ORDER BY key",
        scope,
      )
      .await?;

    rows
      .into_iter()
      .map(|snapshot| {
        let submission: Submission = serde_json::from_value(snapshot.data)
          .map_err(|e| eyre!("Failed to parse queued submission {}: {}", snapshot.key, e))?;
        Ok(PendingMutation {
          id: MutationId::Outbox(snapshot.key),
          resource: ResourceKind::Submission {
            endpoint: submission.endpoint,
          },
          payload: submission.body,
          scope: snapshot.scope,
          created_at: snapshot.fetched_at,
          synced: false,
          in_flight: false,
        })
      })
      .collect()
  }

  /// Everything still waiting for the server in a scope.
  pub async fn pending_mutations(&self, scope: &ScopeId) -> Result<Vec<PendingMutation>> {
    let mut pending: Vec<PendingMutation> = self
      .get_all_unsynced(scope)
      .await?
      .iter()
      .map(PendingMutation::from)
      .collect();
    pending.extend(self.pending_submissions(scope).await?);
    Ok(pending)
  }
}

/// Apply every migration newer than the database's `user_version`.
fn migrate(conn: &Connection) -> Result<()> {
  let version: i64 = conn
    .query_row("PRAGMA user_version", [], |row| row.get(0))
    .map_err(|e| eyre!("Failed to read store version: {}", e))?;
  if version >= schema::current_version() {
    return Ok(());
  }

  for (index, sql) in schema::MIGRATIONS.iter().enumerate().skip(version.max(0) as usize) {
    let target = index + 1;
    conn
      .execute_batch(&format!(
        "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
        sql, target
      ))
      .map_err(|e| eyre!("Failed to migrate store to v{}: {}", target, e))?;
    debug!(version = target, "Migrated local store");
  }

  Ok(())
}

fn format_ts(dt: DateTime<Utc>) -> String {
  // Fixed-width UTC so lexical order matches chronological order
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", s, e))
}

struct ProgressRow {
  id: i64,
  scope: String,
  course_id: String,
  lesson_id: String,
  progress: u8,
  completed_at: Option<String>,
  timestamp: String,
  synced: bool,
  sending: bool,
}

impl ProgressRow {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get(0)?,
      scope: row.get(1)?,
      course_id: row.get(2)?,
      lesson_id: row.get(3)?,
      progress: row.get(4)?,
      completed_at: row.get(5)?,
      timestamp: row.get(6)?,
      synced: row.get(7)?,
      sending: row.get(8)?,
    })
  }

  fn into_record(self) -> Result<ProgressRecord> {
    Ok(ProgressRecord {
      id: self.id,
      scope: ScopeId::new(self.scope),
      course_id: self.course_id,
      lesson_id: self.lesson_id,
      progress: self.progress,
      completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
      timestamp: parse_ts(&self.timestamp)?,
      state: SyncState::from_flags(self.synced, self.sending),
    })
  }
}

struct SnapshotRow {
  key: String,
  data: String,
  scope: String,
  fetched_at: String,
}

impl SnapshotRow {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      key: row.get(0)?,
      data: row.get(1)?,
      scope: row.get(2)?,
      fetched_at: row.get(3)?,
    })
  }

  fn into_snapshot(self) -> Result<Snapshot> {
    let data = serde_json::from_str(&self.data)
      .map_err(|e| eyre!("Failed to deserialize snapshot {}: {}", self.key, e))?;
    Ok(Snapshot {
      key: self.key,
      scope: ScopeId::new(self.scope),
      data,
      fetched_at: parse_ts(&self.fetched_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;
  use serde_json::json;
  use std::sync::Arc;

  fn scope() -> ScopeId {
    ScopeId::new("igreja-1")
  }

  #[tokio::test]
  async fn test_put_progress_is_unsynced() {
    let store = LocalStore::in_memory();
    let id = store
      .put_progress(&NewProgress::new(scope(), "c1", "l1", 100))
      .await
      .unwrap();

    let unsynced = store.get_all_unsynced(&scope()).await.unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].id, id);
    assert_eq!(unsynced[0].state, SyncState::Pending);
    assert!(unsynced[0].completed_at.is_some());
  }

  #[tokio::test]
  async fn test_unsynced_is_partitioned_by_scope() {
    let store = LocalStore::in_memory();
    store
      .put_progress(&NewProgress::new(scope(), "c1", "l1", 10))
      .await
      .unwrap();
    store
      .put_progress(&NewProgress::new("igreja-2".into(), "c1", "l1", 10))
      .await
      .unwrap();

    assert_eq!(store.get_all_unsynced(&scope()).await.unwrap().len(), 1);
    assert!(store
      .get_all_unsynced(&"igreja-3".into())
      .await
      .unwrap()
      .is_empty());
  }

  #[tokio::test]
  async fn test_two_phase_state_transitions() {
    let store = LocalStore::in_memory();
    let id = store
      .put_progress(&NewProgress::new(scope(), "c1", "l1", 50))
      .await
      .unwrap();

    assert!(store.mark_sending(id).await.unwrap());
    // A second claim loses
    assert!(!store.mark_sending(id).await.unwrap());
    let record = store.get_progress(id).await.unwrap().unwrap();
    assert_eq!(record.state, SyncState::Sending);
    // Still counted as unsynced while in flight
    assert_eq!(store.get_all_unsynced(&scope()).await.unwrap().len(), 1);

    assert!(store.release(id).await.unwrap());
    assert_eq!(
      store.get_progress(id).await.unwrap().unwrap().state,
      SyncState::Pending
    );

    store.mark_sending(id).await.unwrap();
    assert!(store.mark_synced(id).await.unwrap());
    assert!(store.get_all_unsynced(&scope()).await.unwrap().is_empty());
    assert!(!store.mark_sending(id).await.unwrap());
    assert_eq!(store.progress_for(&scope()).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_recover_in_flight() {
    let store = LocalStore::in_memory();
    let a = store
      .put_progress(&NewProgress::new(scope(), "c1", "l1", 50))
      .await
      .unwrap();
    let b = store
      .put_progress(&NewProgress::new(scope(), "c1", "l2", 50))
      .await
      .unwrap();
    store.mark_sending(a).await.unwrap();
    store.mark_sending(b).await.unwrap();
    store.mark_synced(b).await.unwrap();

    assert_eq!(store.recover_in_flight().await.unwrap(), 1);
    assert_eq!(
      store.get_progress(a).await.unwrap().unwrap().state,
      SyncState::Pending
    );
  }

  #[tokio::test]
  async fn test_pending_mutations_flag_in_flight_records() {
    let store = LocalStore::in_memory();
    let queued = store
      .put_progress(&NewProgress::new(scope(), "c1", "l1", 50))
      .await
      .unwrap();
    let claimed = store
      .put_progress(&NewProgress::new(scope(), "c1", "l2", 50))
      .await
      .unwrap();
    store.mark_sending(claimed).await.unwrap();
    store
      .enqueue_submission(
        &scope(),
        &Submission {
          endpoint: "/rest/v1/visitantes".to_string(),
          body: json!({"nome": "Ana"}),
        },
      )
      .await
      .unwrap();

    let pending = store.pending_mutations(&scope()).await.unwrap();
    let flags: Vec<(MutationId, bool)> = pending
      .into_iter()
      .map(|m| (m.id, m.in_flight))
      .collect();
    assert_eq!(flags.len(), 3);
    assert!(flags.contains(&(MutationId::Progress(queued), false)));
    assert!(flags.contains(&(MutationId::Progress(claimed), true)));
    assert!(!flags[2].1);
  }

  #[tokio::test]
  async fn test_put_snapshot_same_key_overwrites() {
    let store = LocalStore::in_memory();
    let first = Snapshot {
      key: "curso:1".to_string(),
      scope: scope(),
      data: json!({"titulo": "Fundamentos"}),
      fetched_at: Utc::now(),
    };
    store.put_snapshot(&first).await.unwrap();
    let second = Snapshot {
      data: json!({"titulo": "Fundamentos da Fé"}),
      fetched_at: first.fetched_at + Duration::seconds(1),
      ..first.clone()
    };
    assert!(store.put_snapshot(&second).await.unwrap());

    let cached = store.get_cached(&scope()).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].data, json!({"titulo": "Fundamentos da Fé"}));
  }

  #[tokio::test]
  async fn test_older_snapshot_does_not_replace_newer() {
    let store = LocalStore::in_memory();
    let newer = Snapshot {
      key: "curso:1".to_string(),
      scope: scope(),
      data: json!({"v": 2}),
      fetched_at: Utc::now(),
    };
    store.put_snapshot(&newer).await.unwrap();

    let older = Snapshot {
      data: json!({"v": 1}),
      fetched_at: newer.fetched_at - Duration::minutes(5),
      ..newer.clone()
    };
    assert!(!store.put_snapshot(&older).await.unwrap());
    assert_eq!(
      store.get_snapshot("curso:1").await.unwrap().unwrap().data,
      json!({"v": 2})
    );
  }

  #[tokio::test]
  async fn test_outbox_is_separate_from_snapshots() {
    let store = LocalStore::in_memory();
    let key = store
      .enqueue_submission(
        &scope(),
        &Submission {
          endpoint: "/rest/v1/pedidos_oracao".to_string(),
          body: json!({"pedido": "saúde"}),
        },
      )
      .await
      .unwrap();

    assert!(store.get_cached(&scope()).await.unwrap().is_empty());
    let pending = store.pending_submissions(&scope()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, MutationId::Outbox(key.clone()));
    assert_eq!(
      pending[0].resource,
      ResourceKind::Submission {
        endpoint: "/rest/v1/pedidos_oracao".to_string()
      }
    );

    assert!(store.delete_snapshot(&key).await.unwrap());
    assert!(store.pending_submissions(&scope()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_outbox_keys_keep_insertion_order() {
    let store = LocalStore::in_memory();
    for n in 0..5 {
      store
        .enqueue_submission(
          &scope(),
          &Submission {
            endpoint: "/rest/v1/x".to_string(),
            body: json!({ "n": n }),
          },
        )
        .await
        .unwrap();
    }
    let bodies: Vec<_> = store
      .pending_submissions(&scope())
      .await
      .unwrap()
      .into_iter()
      .map(|m| m.payload["n"].as_i64().unwrap())
      .collect();
    assert_eq!(bodies, vec![0, 1, 2, 3, 4]);
  }

  #[tokio::test]
  async fn test_concurrent_first_use_initializes_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::open(dir.path().join("nested").join("offline.db")));

    let handles: Vec<_> = (0..8)
      .map(|n| {
        let store = store.clone();
        tokio::spawn(async move {
          store
            .put_progress(&NewProgress::new(scope(), "c1", &format!("l{}", n), 10))
            .await
        })
      })
      .collect();

    let mut ids = Vec::new();
    for handle in handles {
      ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(store.get_all_unsynced(&scope()).await.unwrap().len(), 8);
  }

  #[tokio::test]
  async fn test_reopen_keeps_data_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");
    {
      let store = LocalStore::open(&path);
      store
        .put_progress(&NewProgress::new(scope(), "c1", "l1", 10))
        .await
        .unwrap();
    }

    let store = LocalStore::open(&path);
    assert_eq!(store.get_all_unsynced(&scope()).await.unwrap().len(), 1);
    let version: i64 = store
      .with_conn(|conn| {
        conn
          .query_row("PRAGMA user_version", [], |row| row.get(0))
          .map_err(|e| eyre!("{}", e))
      })
      .await
      .unwrap();
    assert_eq!(version, schema::current_version());
  }
}
