//! Versioned schema of the local durable store.
//!
//! `PRAGMA user_version` records how many entries of `MIGRATIONS` have been
//! applied; new versions are appended, never edited.

pub const MIGRATIONS: &[&str] = &[
  // v1: progress queue and generic offline snapshots
  r#"
CREATE TABLE IF NOT EXISTS aluno_progress (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    igreja_id TEXT NOT NULL,
    curso_id TEXT NOT NULL,
    licao_id TEXT NOT NULL,
    progresso INTEGER NOT NULL,
    concluido_em TEXT,
    timestamp TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_aluno_progress_scope
    ON aluno_progress(igreja_id, synced);

CREATE TABLE IF NOT EXISTS offline_data (
    key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    igreja_id TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_offline_data_scope ON offline_data(igreja_id);
"#,
  // v2: in-flight marker for two-phase replay
  r#"
ALTER TABLE aluno_progress ADD COLUMN sending INTEGER NOT NULL DEFAULT 0;
"#,
];

pub fn current_version() -> i64 {
  MIGRATIONS.len() as i64
}
