use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Tenant (church) id partitioning every cached entity and queued mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(String);

impl ScopeId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ScopeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ScopeId {
  fn from(s: &str) -> Self {
    Self::new(s)
  }
}

/// Sync state of a progress record.
///
/// `Sending` is set right before the server call so that a crash between the
/// server acknowledging and the local commit can be detected on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Pending,
  Sending,
  Synced,
}

impl SyncState {
  pub fn is_synced(&self) -> bool {
    matches!(self, Self::Synced)
  }

  pub(crate) fn from_flags(synced: bool, sending: bool) -> Self {
    match (synced, sending) {
      (true, _) => Self::Synced,
      (false, true) => Self::Sending,
      (false, false) => Self::Pending,
    }
  }
}

/// A lesson progress entry about to be written.
#[derive(Debug, Clone)]
pub struct NewProgress {
  pub scope: ScopeId,
  pub course_id: String,
  pub lesson_id: String,
  /// Percent complete, 0-100
  pub progress: u8,
  pub completed_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl NewProgress {
  /// Progress is clamped to 100; reaching 100 stamps the completion time.
  pub fn new(scope: ScopeId, course_id: &str, lesson_id: &str, progress: u8) -> Self {
    let progress = progress.min(100);
    // Stored timestamps keep microseconds
    let now = Utc::now().trunc_subsecs(6);
    Self {
      scope,
      course_id: course_id.to_string(),
      lesson_id: lesson_id.to_string(),
      progress,
      completed_at: (progress == 100).then_some(now),
      created_at: now,
    }
  }

  /// The record this entry becomes once stored under `id`.
  pub fn into_record(self, id: i64, state: SyncState) -> ProgressRecord {
    ProgressRecord {
      id,
      scope: self.scope,
      course_id: self.course_id,
      lesson_id: self.lesson_id,
      progress: self.progress,
      completed_at: self.completed_at,
      timestamp: self.created_at,
      state,
    }
  }
}

/// Row of the `aluno_progress` store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
  pub id: i64,
  pub scope: ScopeId,
  pub course_id: String,
  pub lesson_id: String,
  pub progress: u8,
  pub completed_at: Option<DateTime<Utc>>,
  /// Creation time of the local record
  pub timestamp: DateTime<Utc>,
  pub state: SyncState,
}

impl ProgressRecord {
  pub fn synced(&self) -> bool {
    self.state.is_synced()
  }

  /// Body of the activity insert sent to the server.
  pub fn payload(&self) -> Value {
    json!({
      "igreja_id": self.scope.as_str(),
      "curso_id": self.course_id,
      "licao_id": self.lesson_id,
      "progresso": self.progress,
      "concluido_em": self.completed_at.map(|t| t.to_rfc3339()),
      "created_at": self.timestamp.to_rfc3339(),
    })
  }
}

/// Row of the `offline_data` store: a server resource snapshot under an explicit key.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
  pub key: String,
  pub scope: ScopeId,
  pub data: Value,
  pub fetched_at: DateTime<Utc>,
}

/// A generic form submission waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
  /// Server path the body is POSTed to
  pub endpoint: String,
  pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationId {
  /// Auto-increment id in `aluno_progress`
  Progress(i64),
  /// Explicit key in `offline_data`
  Outbox(String),
}

impl fmt::Display for MutationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Progress(id) => write!(f, "progress#{}", id),
      Self::Outbox(key) => f.write_str(key),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
  LessonProgress,
  Submission { endpoint: String },
}

/// Uniform view of one deferred write, whichever store holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
  pub id: MutationId,
  pub resource: ResourceKind,
  pub payload: Value,
  pub scope: ScopeId,
  pub created_at: DateTime<Utc>,
  pub synced: bool,
  /// Claimed by a drain whose server write has not been committed yet
  pub in_flight: bool,
}

impl PendingMutation {
  /// Stable per-mutation key, identical across replays.
  ///
  /// The payload is part of the key so that writes the local store never
  /// assigned an id (`progress#0`) still get distinct keys.
  pub fn idempotency_key(&self) -> String {
    let input = format!(
      "{}|{}|{}|{}",
      self.scope,
      self.id,
      self.created_at.timestamp_micros(),
      self.payload
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(&hasher.finalize()[..16])
  }
}

impl From<&ProgressRecord> for PendingMutation {
  fn from(record: &ProgressRecord) -> Self {
    Self {
      id: MutationId::Progress(record.id),
      resource: ResourceKind::LessonProgress,
      payload: record.payload(),
      scope: record.scope.clone(),
      created_at: record.timestamp,
      synced: record.synced(),
      in_flight: record.state == SyncState::Sending,
    }
  }
}
