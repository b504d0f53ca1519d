//! The request-intercepting worker: lifecycle, fetch handling, control
//! messages, background-sync tags and push payloads.
//!
//! Every entry point is an explicit method; the agent loop in `app` only
//! forwards events to them.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{CacheRouter, Served};
use crate::config::CachesConfig;
use crate::http::{Network, Request};
use crate::store::{LocalStore, ScopeId};
use crate::sync::{DrainOutcome, QueueKind, Reconciler};

const DEFAULT_NOTIFICATION_TITLE: &str = "Kerigma Hub";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  /// Installed but waiting for the previous version to go away
  Installed,
  Activating,
  Activated,
}

/// Messages a page can post to the worker, e.g. `{"type": "CLEAR_CACHE"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  /// Activate a waiting worker immediately
  SkipWaiting,
  /// Delete every named cache
  ClearCache,
}

impl ControlMessage {
  /// Parse a JSON message or a bare message type.
  pub fn parse(input: &str) -> Result<Self> {
    let input = input.trim();
    if input.starts_with('{') {
      return serde_json::from_str(input)
        .map_err(|e| eyre!("Invalid control message '{}': {}", input, e));
    }
    match input {
      "SKIP_WAITING" => Ok(Self::SkipWaiting),
      "CLEAR_CACHE" => Ok(Self::ClearCache),
      other => Err(eyre!("Unknown control message '{}'", other)),
    }
  }
}

/// Background-sync tags the worker responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTag {
  /// Drains queued generic submissions
  BackgroundSync,
  /// Drains student progress
  AlunoProgress,
}

impl SyncTag {
  pub const ALL: [SyncTag; 2] = [SyncTag::BackgroundSync, SyncTag::AlunoProgress];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::BackgroundSync => "background-sync",
      Self::AlunoProgress => "sync-aluno-progress",
    }
  }

  pub fn parse(tag: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|t| t.as_str() == tag)
  }

  pub fn queue(&self) -> QueueKind {
    match self {
      Self::BackgroundSync => QueueKind::Outbox,
      Self::AlunoProgress => QueueKind::Progress,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A rendered push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub id: Option<String>,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  id: Option<Value>,
}

pub struct Worker {
  router: Arc<CacheRouter>,
  network: Arc<dyn Network>,
  store: Arc<LocalStore>,
  reconciler: Arc<Reconciler>,
  caches: CachesConfig,
  scope: ScopeId,
  state: RwLock<WorkerState>,
  skip_waiting: AtomicBool,
}

impl Worker {
  pub fn new(
    router: Arc<CacheRouter>,
    network: Arc<dyn Network>,
    store: Arc<LocalStore>,
    reconciler: Arc<Reconciler>,
    caches: CachesConfig,
    scope: ScopeId,
  ) -> Self {
    Self {
      router,
      network,
      store,
      reconciler,
      caches,
      scope,
      state: RwLock::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_state(&self, state: WorkerState) {
    debug!(?state, "Worker state");
    *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
  }

  pub fn router(&self) -> &Arc<CacheRouter> {
    &self.router
  }

  /// Precache the app shell, then activate unless an older version's caches
  /// are still around (in which case wait for `SKIP_WAITING`).
  pub async fn install(&self) -> Result<WorkerState> {
    self.set_state(WorkerState::Installing);

    let stored = match self
      .router
      .precache(&self.caches.static_cache(), &self.caches.shell_assets)
      .await
    {
      Ok(stored) => stored,
      Err(e) => {
        self.set_state(WorkerState::Parsed);
        return Err(e);
      }
    };
    info!(
      stored,
      total = self.caches.shell_assets.len(),
      "Worker installed"
    );
    self.set_state(WorkerState::Installed);

    if self.skip_waiting.load(Ordering::SeqCst) || self.stale_caches()?.is_empty() {
      self.activate().await?;
    } else {
      info!("Previous version still cached; waiting for SKIP_WAITING");
    }

    Ok(self.state())
  }

  /// Resume a worker an earlier run already installed, otherwise install.
  ///
  /// A resumed worker skips `activate`, so mutations another process has in
  /// flight are left alone.
  pub async fn start(&self) -> Result<WorkerState> {
    if self
      .router
      .storage()
      .entry_count(&self.caches.static_cache())?
      > 0
    {
      debug!("Shell already cached, resuming");
      self.set_state(WorkerState::Activated);
      return Ok(WorkerState::Activated);
    }
    self.install().await
  }

  /// Caches not owned by the current version.
  fn stale_caches(&self) -> Result<Vec<String>> {
    let current = self.caches.cache_names();
    Ok(
      self
        .router
        .storage()
        .cache_names()?
        .into_iter()
        .filter(|name| !current.contains(name))
        .collect(),
    )
  }

  /// Drop stale caches and re-queue mutations an earlier run left in flight.
  /// Returns how many caches were deleted.
  pub async fn activate(&self) -> Result<usize> {
    self.set_state(WorkerState::Activating);

    let stale = self.stale_caches()?;
    for name in &stale {
      self.router.storage().delete_cache(name)?;
      info!(cache = %name, "Deleted old cache");
    }

    if let Err(e) = self.store.recover_in_flight().await {
      warn!(error = %e, "Failed to recover in-flight mutations");
    }

    self.set_state(WorkerState::Activated);
    info!("Worker activated");
    Ok(stale.len())
  }

  /// Serve a request. Until activation the worker does not intercept.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Served> {
    if self.state() != WorkerState::Activated {
      let response = self.network.fetch(request).await?;
      return Ok(Served::pass_through(response));
    }
    self.router.handle(request).await
  }

  pub async fn handle_message(&self, message: ControlMessage) -> Result<()> {
    match message {
      ControlMessage::SkipWaiting => {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Installed {
          self.activate().await?;
        }
      }
      ControlMessage::ClearCache => {
        let cleared = self.clear_caches()?;
        info!(count = cleared, "Cleared caches");
      }
    }
    Ok(())
  }

  /// Delete every named cache. Returns how many existed.
  pub fn clear_caches(&self) -> Result<usize> {
    let storage = self.router.storage();
    let names = storage.cache_names()?;
    for name in &names {
      storage.delete_cache(name)?;
    }
    Ok(names.len())
  }

  /// Background-sync wake. Unknown tags are ignored.
  pub async fn handle_sync(&self, tag: &str) -> Result<Option<DrainOutcome>> {
    let Some(tag) = SyncTag::parse(tag) else {
      warn!(tag, "Ignoring unknown sync tag");
      return Ok(None);
    };

    debug!(tag = tag.as_str(), scope = %self.scope, "Background sync");
    let outcome = self.reconciler.drain(&self.scope, &[tag.queue()]).await?;
    Ok(Some(outcome))
  }

  /// Render a push payload (`{title, body, id}`) into a notification.
  pub fn handle_push(&self, data: Option<&[u8]>) -> Notification {
    let payload = match data {
      None => PushPayload::default(),
      Some(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|e| {
        debug!(error = %e, "Push payload is not JSON, using it as body");
        PushPayload {
          body: Some(String::from_utf8_lossy(bytes).into_owned()),
          ..PushPayload::default()
        }
      }),
    };

    let id = payload.id.map(|id| match id {
      Value::String(s) => s,
      other => other.to_string(),
    });

    Notification {
      title: payload
        .title
        .unwrap_or_else(|| DEFAULT_NOTIFICATION_TITLE.to_string()),
      body: payload.body.unwrap_or_default(),
      id,
      actions: vec![
        NotificationAction {
          action: "explore".to_string(),
          title: "Ver detalhes".to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Fechar".to_string(),
        },
      ],
    }
  }
}
