//! Server side of a replay: where queued mutations are written.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;
use url::Url;

use crate::http::{Network, Request};
use crate::store::{PendingMutation, ResourceKind};

#[async_trait]
pub trait SyncTarget: Send + Sync {
  /// Write one mutation. `Ok` means the server acknowledged it.
  async fn send(&self, mutation: &PendingMutation) -> Result<()>;
}

/// Posts mutations to the backend's REST endpoints.
pub struct RestSyncTarget {
  network: Arc<dyn Network>,
  base: Url,
  progress_table: String,
}

impl RestSyncTarget {
  pub fn new(network: Arc<dyn Network>, base: Url, progress_table: &str) -> Self {
    Self {
      network,
      base,
      progress_table: progress_table.to_string(),
    }
  }

  fn endpoint(&self, resource: &ResourceKind) -> Result<Url> {
    let path = match resource {
      ResourceKind::LessonProgress => format!("/rest/v1/{}", self.progress_table),
      ResourceKind::Submission { endpoint } => endpoint.clone(),
    };
    self
      .base
      .join(&path)
      .map_err(|e| eyre!("Invalid endpoint '{}': {}", path, e))
  }
}

#[async_trait]
impl SyncTarget for RestSyncTarget {
  async fn send(&self, mutation: &PendingMutation) -> Result<()> {
    let body = serde_json::to_vec(&mutation.payload)
      .map_err(|e| eyre!("Failed to serialize {}: {}", mutation.id, e))?;

    let request = Request::new(Method::POST, self.endpoint(&mutation.resource)?)
      .with_header("Content-Type", "application/json")
      .with_header("Prefer", "return=minimal")
      .with_header("Idempotency-Key", &mutation.idempotency_key())
      .with_body(body);

    let response = self.network.fetch(&request).await?;
    if !response.is_success() {
      return Err(eyre!(
        "Server rejected {} with HTTP {}",
        mutation.id,
        response.status
      ));
    }

    Ok(())
  }
}
