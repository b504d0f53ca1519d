use crate::cache::{CacheRouter, CacheStorage, RouterConfig, ServeSource, SqliteStorage};
use crate::config::Config;
use crate::connectivity::Connectivity;
use crate::event::{Event, EventHandler};
use crate::http::{HttpNetwork, Network, OfflineNetwork, Request};
use crate::store::{LocalStore, NewProgress, ResourceKind, ScopeId, Submission};
use crate::sync::{
  DrainOutcome, ProgressRecorder, QueueKind, Reconciler, RestSyncTarget, RouterReloader,
};
use crate::worker::{ControlMessage, Worker};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The wired-up agent: worker, stores, reconciler and connectivity signal
pub struct App {
  config: Config,
  scope: ScopeId,
  /// Forced offline mode; the network is never touched
  offline: bool,
  network: Arc<dyn Network>,
  store: Arc<LocalStore>,
  reconciler: Arc<Reconciler>,
  recorder: ProgressRecorder,
  connectivity: Arc<Connectivity>,
  worker: Worker,
}

impl App {
  pub fn new(config: Config, scope: Option<String>, offline: bool) -> Result<Self> {
    let scope = scope
      .or_else(|| config.scope.clone())
      .map(ScopeId::new)
      .ok_or_else(|| eyre!("No scope configured. Pass --scope or set `scope` in the config file"))?;

    let network: Arc<dyn Network> = if offline {
      Arc::new(OfflineNetwork)
    } else {
      let origin = RouterConfig::from_config(&config)?.origin;
      Arc::new(HttpNetwork::new(origin, Config::get_api_key())?)
    };

    let storage = Arc::new(SqliteStorage::open(&config.storage.cache_db_path()?)?);
    let store = Arc::new(LocalStore::open(config.storage.store_db_path()?));

    Self::from_parts(config, scope, offline, network, storage, store)
  }

  /// Wire the worker, reconciler and recorder over already opened stores.
  fn from_parts(
    config: Config,
    scope: ScopeId,
    offline: bool,
    network: Arc<dyn Network>,
    storage: Arc<dyn CacheStorage>,
    store: Arc<LocalStore>,
  ) -> Result<Self> {
    let router_config = RouterConfig::from_config(&config)?;
    let origin = router_config.origin.clone();

    let router = Arc::new(CacheRouter::new(
      router_config,
      storage,
      network.clone(),
    ));
    let target = Arc::new(RestSyncTarget::new(
      network.clone(),
      origin,
      &config.server.progress_table,
    ));
    let reloader = Arc::new(RouterReloader::new(
      router.clone(),
      store.clone(),
      config.sync.reload_paths.clone(),
    ));
    let reconciler =
      Arc::new(Reconciler::new(store.clone(), target.clone()).with_reloader(reloader));

    // Assume offline until the first probe says otherwise
    let connectivity = Arc::new(Connectivity::new(false));
    let recorder = ProgressRecorder::new(store.clone(), target, connectivity.subscribe());

    let worker = Worker::new(
      router,
      network.clone(),
      store.clone(),
      reconciler.clone(),
      config.caches.clone(),
      scope.clone(),
    );

    Ok(Self {
      config,
      scope,
      offline,
      network,
      store,
      reconciler,
      recorder,
      connectivity,
      worker,
    })
  }

  /// Probe the server once and publish the result.
  async fn detect_connectivity(&self) -> Result<bool> {
    if self.offline {
      return Ok(false);
    }
    let url = self.worker.router().config().resolve(&self.config.sync.probe_path)?;
    let online = Connectivity::probe(self.network.as_ref(), &url).await;
    self.connectivity.set_online(online);
    Ok(online)
  }

  pub async fn fetch(&self, path: &str, navigate: bool, image: bool) -> Result<()> {
    self.worker.start().await?;

    let url = self.worker.router().config().resolve(path)?;
    let request = if navigate {
      Request::navigate(url)
    } else if image {
      Request::image(url)
    } else {
      Request::get(url)
    };

    let served = self.worker.handle_fetch(&request).await?;
    println!("status:  {}", served.response.status);
    println!("source:  {}", served.source);
    if let Some(rule) = &served.rule {
      println!("rule:    {}", rule);
    }
    if let Some(cached_at) = served.cached_at {
      println!("cached:  {}", cached_at.to_rfc3339());
    }
    if let Some(content_type) = served.response.header("content-type") {
      println!("type:    {}", content_type);
    }
    println!("bytes:   {}", served.response.body.len());
    if served.source == ServeSource::OfflineFallback {
      warn!(path, "Served offline fallback");
    }
    Ok(())
  }

  pub async fn progress(&self, course: &str, lesson: &str, percent: u8) -> Result<()> {
    self.detect_connectivity().await?;
    let outcome = self
      .recorder
      .record(NewProgress::new(self.scope.clone(), course, lesson, percent))
      .await;
    println!("{:?}", outcome);
    Ok(())
  }

  pub async fn submit(&self, endpoint: &str, body: &str) -> Result<()> {
    let body: serde_json::Value =
      serde_json::from_str(body).map_err(|e| eyre!("Invalid JSON body: {}", e))?;
    let submission = Submission {
      endpoint: endpoint.to_string(),
      body,
    };
    let key = self.store.enqueue_submission(&self.scope, &submission).await?;
    println!("queued {}", key);

    if self.detect_connectivity().await? {
      self.drain(&[QueueKind::Outbox]).await?;
    }
    Ok(())
  }

  pub async fn pending(&self) -> Result<()> {
    let pending = self.store.pending_mutations(&self.scope).await?;
    if pending.is_empty() {
      println!("Nothing pending for {}", self.scope);
      return Ok(());
    }

    let mut in_flight = 0;
    for mutation in pending {
      let resource = match &mutation.resource {
        ResourceKind::LessonProgress => "lesson-progress".to_string(),
        ResourceKind::Submission { endpoint } => endpoint.clone(),
      };
      if mutation.in_flight {
        in_flight += 1;
      }
      println!(
        "{:<20} {:<28} {:<9} {}  {}",
        mutation.id,
        resource,
        if mutation.in_flight { "in-flight" } else { "queued" },
        mutation.created_at.to_rfc3339(),
        mutation.payload
      );
    }
    if in_flight > 0 {
      // Only activation re-queues these; one-shot commands never do.
      warn!(
        count = in_flight,
        "Mutations stuck in flight; they are retried once `run` activates the worker"
      );
    }
    Ok(())
  }

  /// What the portal can show without the network: local progress (synced
  /// or not) and the cached server snapshots.
  pub async fn portal(&self) -> Result<()> {
    for record in self.store.progress_for(&self.scope).await? {
      println!(
        "{} / {:<16} {:>3}%  {:?}",
        record.course_id, record.lesson_id, record.progress, record.state
      );
    }
    for snapshot in self.store.get_cached(&self.scope).await? {
      println!("{:<48} {}", snapshot.key, snapshot.fetched_at.to_rfc3339());
    }
    Ok(())
  }

  /// Manual drain. `tag` restricts it to one background-sync tag.
  pub async fn sync(&self, tag: Option<&str>) -> Result<()> {
    if !self.detect_connectivity().await? {
      return Err(eyre!("Server unreachable, nothing synced"));
    }

    let outcome = match tag {
      Some(tag) => self
        .worker
        .handle_sync(tag)
        .await?
        .ok_or_else(|| eyre!("Unknown sync tag '{}'", tag))?,
      None => self.reconciler.drain(&self.scope, &QueueKind::ALL).await?,
    };
    print_outcome(&outcome);
    Ok(())
  }

  async fn drain(&self, queues: &[QueueKind]) -> Result<()> {
    let outcome = self.reconciler.drain(&self.scope, queues).await?;
    print_outcome(&outcome);
    Ok(())
  }

  pub fn caches(&self) -> Result<()> {
    let storage = self.worker.router().storage();
    let names = storage.cache_names()?;
    if names.is_empty() {
      println!("No caches");
    }
    for name in names {
      println!("{:<28} {}", name, storage.entry_count(&name)?);
    }
    Ok(())
  }

  pub async fn clear_cache(&self) -> Result<()> {
    self.worker.handle_message(ControlMessage::ClearCache).await
  }

  pub fn push(&self, payload: &str) -> Result<()> {
    let notification = self.worker.handle_push(Some(payload.as_bytes()));
    let rendered = serde_json::to_string_pretty(&notification)
      .map_err(|e| eyre!("Failed to render notification: {}", e))?;
    println!("{}", rendered);
    Ok(())
  }

  /// Subscribe the agent's event stream, then start polling the server.
  ///
  /// The stream exists before the first check publishes, so the initial
  /// offline to online transition reaches the loop.
  fn listen(&self) -> Result<(EventHandler, Option<JoinHandle<()>>)> {
    let events = EventHandler::new(
      self.connectivity.subscribe(),
      Duration::from_secs(self.config.sync.interval_secs),
    );

    if self.offline {
      return Ok((events, None));
    }
    let url = self.worker.router().config().resolve(&self.config.sync.probe_path)?;
    let poller = self.connectivity.spawn_probe(
      self.network.clone(),
      url,
      Duration::from_secs(self.config.sync.probe_interval_secs),
    );
    Ok((events, Some(poller)))
  }

  /// Dispatch one agent event.
  async fn handle_event(&self, event: Event) -> Result<()> {
    match event {
      Event::Connectivity(true) => {
        info!("Back online, draining queues");
        self.drain(&QueueKind::ALL).await?;
      }
      Event::Connectivity(false) => info!("Offline, writes will be queued"),
      Event::SyncWake(tag) => {
        if self.connectivity.is_online() {
          self.worker.handle_sync(tag.as_str()).await?;
        }
      }
      Event::Message(message) => {
        self.worker.handle_message(message).await?;
        info!(?message, state = ?self.worker.state(), "Control message handled");
      }
      Event::Shutdown => {}
    }
    Ok(())
  }

  /// Long-running agent loop. Returns on Ctrl-C.
  pub async fn run(&self) -> Result<()> {
    let state = self.worker.install().await?;
    info!(scope = %self.scope, ?state, "Agent started");

    let (mut events, poller) = self.listen()?;
    events.listen_stdin();

    while let Some(event) = events.next().await {
      if event == Event::Shutdown {
        break;
      }
      if let Err(e) = self.handle_event(event.clone()).await {
        warn!(?event, error = %e, "Event handling failed");
      }
    }

    if let Some(poller) = poller {
      poller.abort();
    }
    info!("Agent stopped");
    Ok(())
  }
}

fn print_outcome(outcome: &DrainOutcome) {
  match outcome {
    DrainOutcome::AlreadyDraining => println!("A drain is already running for this scope"),
    DrainOutcome::Completed(report) => println!(
      "attempted {}, synced {}, failed {}{}",
      report.attempted,
      report.synced,
      report.failed,
      if report.reloaded { ", portal data reloaded" } else { "" }
    ),
  }
}
