//! Refresh of server-authoritative data after a successful drain.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheRouter, ServeSource};
use crate::http::Request;
use crate::store::{LocalStore, ScopeId, Snapshot};

#[async_trait]
pub trait Reloader: Send + Sync {
  async fn reload(&self, scope: &ScopeId) -> Result<()>;
}

/// Re-fetches the portal collections of a scope through the router, which
/// refreshes the response caches, and keeps a snapshot of each in the store.
pub struct RouterReloader {
  router: Arc<CacheRouter>,
  store: Arc<LocalStore>,
  paths: Vec<String>,
}

impl RouterReloader {
  pub fn new(router: Arc<CacheRouter>, store: Arc<LocalStore>, paths: Vec<String>) -> Self {
    Self {
      router,
      store,
      paths,
    }
  }

  pub fn snapshot_key(path: &str, scope: &ScopeId) -> String {
    format!("portal:{}:{}", path, scope)
  }
}

#[async_trait]
impl Reloader for RouterReloader {
  async fn reload(&self, scope: &ScopeId) -> Result<()> {
    let mut refreshed = 0;

    for path in &self.paths {
      let mut url = self.router.config().resolve(path)?;
      url
        .query_pairs_mut()
        .append_pair("igreja_id", &format!("eq.{}", scope));

      let served = self.router.handle(&Request::get(url)).await?;
      if served.source != ServeSource::Network || !served.response.is_ok() {
        debug!(path = %path, source = %served.source, "Collection not refreshed");
        continue;
      }

      match serde_json::from_slice(&served.response.body) {
        Ok(data) => {
          let snapshot = Snapshot {
            key: Self::snapshot_key(path, scope),
            scope: scope.clone(),
            data,
            fetched_at: Utc::now(),
          };
          if let Err(e) = self.store.put_snapshot(&snapshot).await {
            warn!(path = %path, error = %e, "Failed to store snapshot");
          }
          refreshed += 1;
        }
        Err(e) => warn!(path = %path, error = %e, "Collection is not JSON"),
      }
    }

    if refreshed == 0 && !self.paths.is_empty() {
      return Err(eyre!("No collection could be reloaded for scope {}", scope));
    }
    Ok(())
  }
}
