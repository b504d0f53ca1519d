//! Cache router: classifies each request and applies the rule's strategy.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::storage::{CacheStorage, CachedResponse};
use super::strategy::{Fallback, RouteRule, RouterConfig, StorePolicy, Strategy};
use super::traits::{request_key, Served};
use crate::http::{Network, Request, Response};

const PRECACHE_CONCURRENCY: usize = 4;

/// Sits between callers and the network, serving GETs from the named caches
/// according to the route table. Network errors never reach the caller of an
/// intercepted request; they degrade to cached data or an offline document.
pub struct CacheRouter {
  storage: Arc<dyn CacheStorage>,
  network: Arc<dyn Network>,
  config: RouterConfig,
}

impl CacheRouter {
  pub fn new(config: RouterConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
    Self {
      storage,
      network,
      config,
    }
  }

  pub fn config(&self) -> &RouterConfig {
    &self.config
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  /// Route one request.
  ///
  /// Non-GET requests are passed straight to the network and their errors
  /// propagate unchanged.
  pub async fn handle(&self, request: &Request) -> Result<Served> {
    if !request.is_get() {
      let response = self.network.fetch(request).await?;
      return Ok(Served::pass_through(response));
    }

    let Some(rule) = self.config.classify(request) else {
      let response = self.network.fetch(request).await?;
      return Ok(Served::pass_through(response));
    };

    debug!(rule = %rule.name, url = %request.url, "Routing request");
    let key = request_key(request);

    let served = match rule.strategy {
      Strategy::CacheFirst(policy) => self.cache_first(rule, request, &key, policy).await,
      Strategy::NetworkFirst { timeout } => self.network_first(rule, request, &key, timeout).await,
      Strategy::NetworkOnly => self.network_only(rule, request).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(rule, request, &key).await,
    };

    Ok(served.with_rule(&rule.name))
  }

  async fn cache_first(
    &self,
    rule: &RouteRule,
    request: &Request,
    key: &str,
    policy: StorePolicy,
  ) -> Served {
    if let Some(hit) = self.lookup(&rule.cache, key) {
      return Served::from_cache(hit.response, hit.cached_at);
    }

    match fetch_and_store(
      self.network.clone(),
      self.storage.clone(),
      request.clone(),
      rule.cache.clone(),
      key.to_string(),
      policy,
    )
    .await
    {
      Ok(response) => Served::from_network(response),
      Err(e) => {
        warn!(rule = %rule.name, error = %e, "Network failed on cache miss");
        self.fallback(rule.fallback, request)
      }
    }
  }

  /// Fetch first. With a timeout the fetch runs on its own task so that a late
  /// response still refreshes the cache after the caller has been answered.
  async fn network_first(
    &self,
    rule: &RouteRule,
    request: &Request,
    key: &str,
    timeout: Option<Duration>,
  ) -> Served {
    let fetch = fetch_and_store(
      self.network.clone(),
      self.storage.clone(),
      request.clone(),
      rule.cache.clone(),
      key.to_string(),
      StorePolicy::OkOnly,
    );

    let outcome = match timeout {
      None => fetch.await,
      Some(limit) => {
        let task = tokio::spawn(fetch);
        match tokio::time::timeout(limit, task).await {
          Ok(Ok(result)) => result,
          Ok(Err(e)) => Err(eyre!("Fetch task failed: {}", e)),
          Err(_) => Err(eyre!("No response within {:?}", limit)),
        }
      }
    };

    match outcome {
      Ok(response) => Served::from_network(response),
      Err(e) => {
        debug!(rule = %rule.name, error = %e, "Network unavailable, trying cache");
        match self.lookup(&rule.cache, key) {
          Some(hit) => Served::from_cache(hit.response, hit.cached_at),
          None => self.fallback(rule.fallback, request),
        }
      }
    }
  }

  async fn network_only(&self, rule: &RouteRule, request: &Request) -> Served {
    match self.network.fetch(request).await {
      Ok(response) => Served::from_network(response),
      Err(e) => {
        debug!(rule = %rule.name, error = %e, "Network unavailable, serving fallback");
        self.fallback(rule.fallback, request)
      }
    }
  }

  async fn stale_while_revalidate(&self, rule: &RouteRule, request: &Request, key: &str) -> Served {
    let refresh = fetch_and_store(
      self.network.clone(),
      self.storage.clone(),
      request.clone(),
      rule.cache.clone(),
      key.to_string(),
      StorePolicy::Success,
    );

    if let Some(hit) = self.lookup(&rule.cache, key) {
      let url = request.url.clone();
      tokio::spawn(async move {
        if let Err(e) = refresh.await {
          debug!(url = %url, error = %e, "Background revalidation failed");
        }
      });
      return Served::from_cache(hit.response, hit.cached_at);
    }

    match refresh.await {
      Ok(response) => Served::from_network(response),
      Err(e) => {
        warn!(rule = %rule.name, error = %e, "Network failed on cache miss");
        self.fallback(rule.fallback, request)
      }
    }
  }

  /// Storage errors are treated as misses.
  fn lookup(&self, cache: &str, key: &str) -> Option<CachedResponse> {
    match self.storage.match_request(cache, key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(cache, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  fn lookup_document(&self, path: &str) -> Option<CachedResponse> {
    let url = self.config.resolve(path).ok()?;
    let key = request_key(&Request::get(url));
    match self.storage.match_any(&key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(path, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  fn fallback(&self, fallback: Fallback, request: &Request) -> Served {
    let document = match fallback {
      Fallback::None => None,
      Fallback::OfflineDocument => self.lookup_document(&self.config.offline_document),
      Fallback::ShellDocument if request.is_navigation() => self
        .lookup_document(&self.config.root_document)
        .or_else(|| self.lookup_document(&self.config.offline_document)),
      Fallback::ShellDocument => None,
    };

    match document {
      Some(hit) => Served::offline(hit.response),
      None => Served::offline(Response::offline_unavailable()),
    }
  }

  /// Fetch `paths` into `cache` ahead of time. Individual failures are logged
  /// and skipped. Returns how many were stored.
  pub async fn precache(&self, cache: &str, paths: &[String]) -> Result<usize> {
    use futures::{stream, StreamExt};

    self.storage.open_cache(cache)?;

    let requests = paths
      .iter()
      .map(|path| Ok(Request::get(self.config.resolve(path)?)))
      .collect::<Result<Vec<_>>>()?;

    let fetched: Vec<_> = stream::iter(requests)
      .map(|request| async move {
        let result = self.network.fetch(&request).await;
        (request, result)
      })
      .buffer_unordered(PRECACHE_CONCURRENCY)
      .collect()
      .await;

    let mut stored = 0;
    for (request, result) in fetched {
      match result {
        Ok(response) if response.is_success() => {
          self
            .storage
            .put(cache, &request_key(&request), request.url.as_str(), &response)?;
          stored += 1;
        }
        Ok(response) => {
          warn!(path = request.path(), status = response.status, "Skipping precache of asset");
        }
        Err(e) => {
          warn!(path = request.path(), error = %e, "Failed to precache asset");
        }
      }
    }

    Ok(stored)
  }
}

/// Fetch `request` and write the response to `cache` when `policy` allows.
async fn fetch_and_store(
  network: Arc<dyn Network>,
  storage: Arc<dyn CacheStorage>,
  request: Request,
  cache: String,
  key: String,
  policy: StorePolicy,
) -> Result<Response> {
  let response = network.fetch(&request).await?;

  if policy.should_store(&response) {
    if let Err(e) = storage.put(&cache, &key, request.url.as_str(), &response) {
      warn!(cache = %cache, error = %e, "Failed to store response");
    }
  }

  Ok(response)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{ServeSource, SqliteStorage};
  use crate::config::Config;
  use crate::testing::MockNetwork;

  fn router_with(network: Arc<MockNetwork>, timeout_ms: u64) -> CacheRouter {
    let config = Config::from_yaml(&format!(
      "server:\n  url: https://app.example\ncaches:\n  network_timeout_ms: {}\n",
      timeout_ms
    ))
    .unwrap();
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    CacheRouter::new(RouterConfig::from_config(&config).unwrap(), storage, network)
  }

  fn url(router: &CacheRouter, path: &str) -> url::Url {
    router.config().resolve(path).unwrap()
  }

  #[tokio::test]
  async fn test_shell_asset_cache_first() {
    let network = MockNetwork::new();
    network.respond("/manifest.json", Response::new(200, "{}"));
    let router = router_with(network.clone(), 3000);
    let request = Request::get(url(&router, "/manifest.json"));

    let first = router.handle(&request).await.unwrap();
    assert_eq!(first.source, ServeSource::Network);

    // Populated after first fetch; served from cache even with the network gone
    network.set_online(false);
    let second = router.handle(&request).await.unwrap();
    assert_eq!(second.source, ServeSource::Cache);
    assert_eq!(second.response.body, b"{}");
    assert_eq!(network.calls("/manifest.json"), 1);
  }

  #[tokio::test]
  async fn test_image_non_200_not_cached() {
    let network = MockNetwork::new();
    network.respond("/img/avatar.png", Response::new(404, "missing"));
    let router = router_with(network.clone(), 3000);
    let request = Request::image(url(&router, "/img/avatar.png"));

    let first = router.handle(&request).await.unwrap();
    assert_eq!(first.response.status, 404);
    let second = router.handle(&request).await.unwrap();
    assert_eq!(second.source, ServeSource::Network);
    assert_eq!(network.calls("/img/avatar.png"), 2);
    assert_eq!(router.storage().entry_count("kerigma-images-v1").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_image_200_cached() {
    let network = MockNetwork::new();
    network.respond("/img/logo.png", Response::new(200, vec![0x89, 0x50]));
    let router = router_with(network.clone(), 3000);
    let request = Request::image(url(&router, "/img/logo.png"));

    router.handle(&request).await.unwrap();
    let second = router.handle(&request).await.unwrap();
    assert_eq!(second.source, ServeSource::Cache);
    assert_eq!(network.calls("/img/logo.png"), 1);
  }

  #[tokio::test]
  async fn test_critical_api_timeout_serves_cache() {
    let network = MockNetwork::new();
    network.respond("/rest/v1/aluno_progress", Response::new(200, "[1]"));
    let router = router_with(network.clone(), 50);
    let request = Request::get(url(&router, "/rest/v1/aluno_progress"));

    // Seed the cache with a first, fast response
    router.handle(&request).await.unwrap();

    network.respond("/rest/v1/aluno_progress", Response::new(200, "[1,2]"));
    network.delay("/rest/v1/aluno_progress", Duration::from_millis(500));
    let served = router.handle(&request).await.unwrap();
    assert_eq!(served.source, ServeSource::Cache);
    assert_eq!(served.response.body, b"[1]");
  }

  #[tokio::test]
  async fn test_critical_api_late_response_refreshes_cache() {
    let network = MockNetwork::new();
    network.respond("/portal-aluno/cursos", Response::new(200, "old"));
    let router = router_with(network.clone(), 30);
    let request = Request::get(url(&router, "/portal-aluno/cursos"));
    router.handle(&request).await.unwrap();

    network.respond("/portal-aluno/cursos", Response::new(200, "new"));
    network.delay("/portal-aluno/cursos", Duration::from_millis(100));
    let served = router.handle(&request).await.unwrap();
    assert_eq!(served.response.body, b"old");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let hit = router
      .storage()
      .match_request("kerigma-aluno-v1", &request_key(&request))
      .unwrap()
      .unwrap();
    assert_eq!(hit.response.body, b"new");
  }

  #[tokio::test]
  async fn test_critical_api_timeout_without_cache_is_offline() {
    let network = MockNetwork::new();
    network.respond("/rest/v1/cursos", Response::new(200, "[]"));
    network.delay("/rest/v1/cursos", Duration::from_millis(500));
    let router = router_with(network, 30);

    let served = router
      .handle(&Request::get(url(&router, "/rest/v1/cursos")))
      .await
      .unwrap();
    assert_eq!(served.source, ServeSource::OfflineFallback);
    assert_eq!(served.response.status, 503);
  }

  #[tokio::test]
  async fn test_api_network_first_prefers_fresh_response() {
    let network = MockNetwork::new();
    network.respond("/rest/v1/celulas", Response::new(200, "v1"));
    let router = router_with(network.clone(), 3000);
    let request = Request::get(url(&router, "/rest/v1/celulas"));
    router.handle(&request).await.unwrap();

    network.respond("/rest/v1/celulas", Response::new(200, "v2"));
    let served = router.handle(&request).await.unwrap();
    assert_eq!(served.source, ServeSource::Network);
    assert_eq!(served.response.body, b"v2");

    network.set_online(false);
    let served = router.handle(&request).await.unwrap();
    assert_eq!(served.source, ServeSource::Cache);
    assert_eq!(served.response.body, b"v2");
  }

  #[tokio::test]
  async fn test_api_failure_falls_back_to_offline_document() {
    let network = MockNetwork::new();
    network.respond("/offline.html", Response::new(200, "<h1>Sem conexão</h1>"));
    let router = router_with(network.clone(), 3000);
    router
      .precache("kerigma-static-v1", &["/offline.html".to_string()])
      .await
      .unwrap();

    network.set_online(false);
    let served = router
      .handle(&Request::get(url(&router, "/functions/v1/gerar-quiz")))
      .await
      .unwrap();
    assert_eq!(served.source, ServeSource::OfflineFallback);
    assert_eq!(served.response.body, "<h1>Sem conexão</h1>".as_bytes());
  }

  #[tokio::test]
  async fn test_navigation_offline_serves_cached_root() {
    let network = MockNetwork::new();
    network.respond("/", Response::new(200, "<html>root</html>"));
    network.respond("/offline.html", Response::new(200, "<html>offline</html>"));
    let router = router_with(network.clone(), 3000);
    router
      .precache(
        "kerigma-static-v1",
        &["/".to_string(), "/offline.html".to_string()],
      )
      .await
      .unwrap();

    network.set_online(false);
    let served = router
      .handle(&Request::navigate(url(&router, "/agenda")))
      .await
      .unwrap();
    assert_eq!(served.source, ServeSource::OfflineFallback);
    assert_eq!(served.response.body, b"<html>root</html>");
  }

  #[tokio::test]
  async fn test_navigation_offline_serves_root_over_previously_visited_page() {
    let network = MockNetwork::new();
    network.respond("/", Response::new(200, "<html>root</html>"));
    network.respond("/agenda", Response::new(200, "<html>agenda-page</html>"));
    let router = router_with(network.clone(), 3000);
    router
      .precache("kerigma-static-v1", &["/".to_string()])
      .await
      .unwrap();

    let online = router
      .handle(&Request::navigate(url(&router, "/agenda")))
      .await
      .unwrap();
    assert_eq!(online.source, ServeSource::Network);
    assert_eq!(online.response.body, b"<html>agenda-page</html>");

    network.set_online(false);
    let served = router
      .handle(&Request::navigate(url(&router, "/agenda")))
      .await
      .unwrap();
    assert_eq!(served.source, ServeSource::OfflineFallback);
    assert_eq!(served.response.body, b"<html>root</html>");
  }

  #[tokio::test]
  async fn test_navigation_offline_without_root_serves_offline_document() {
    let network = MockNetwork::new();
    network.respond("/offline.html", Response::new(200, "<html>offline</html>"));
    let router = router_with(network.clone(), 3000);
    router
      .precache("kerigma-static-v1", &["/offline.html".to_string()])
      .await
      .unwrap();

    network.set_online(false);
    let served = router
      .handle(&Request::navigate(url(&router, "/agenda")))
      .await
      .unwrap();
    assert_eq!(served.response.body, b"<html>offline</html>");
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_serves_cache_and_refreshes() {
    let network = MockNetwork::new();
    network.respond("/assets/app.js", Response::new(200, "v1"));
    let router = router_with(network.clone(), 3000);
    let request = Request::get(url(&router, "/assets/app.js"));

    let first = router.handle(&request).await.unwrap();
    assert_eq!(first.source, ServeSource::Network);

    network.respond("/assets/app.js", Response::new(200, "v2"));
    let second = router.handle(&request).await.unwrap();
    assert_eq!(second.source, ServeSource::Cache);
    assert_eq!(second.response.body, b"v1");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let third = router.handle(&request).await.unwrap();
    assert_eq!(third.source, ServeSource::Cache);
    assert_eq!(third.response.body, b"v2");
  }

  #[tokio::test]
  async fn test_non_get_passes_through_uncached() {
    let network = MockNetwork::new();
    network.respond("/rest/v1/aluno_progress", Response::new(201, ""));
    let router = router_with(network.clone(), 3000);
    let request = Request::new(reqwest::Method::POST, url(&router, "/rest/v1/aluno_progress"));

    let served = router.handle(&request).await.unwrap();
    assert_eq!(served.source, ServeSource::PassThrough);
    assert!(router.storage().cache_names().unwrap().is_empty());

    network.set_online(false);
    assert!(router.handle(&request).await.is_err());
  }
}
