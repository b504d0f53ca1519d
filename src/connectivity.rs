//! Online/offline signal shared by the recorder and the agent loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use crate::http::{Network, Request};

/// How long a probe may take before the server is considered unreachable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Connectivity {
  tx: watch::Sender<bool>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx }
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Publish the current state. Returns true on an offline→online transition.
  pub fn set_online(&self, online: bool) -> bool {
    let mut came_online = false;
    self.tx.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      came_online = online;
      *current = online;
      true
    });

    if came_online {
      info!("Connection restored");
    }
    came_online
  }

  /// Any HTTP response counts as reachable; transport errors and timeouts do not.
  pub async fn probe(network: &dyn Network, url: &Url) -> bool {
    let request = Request::get(url.clone());
    matches!(
      tokio::time::timeout(PROBE_TIMEOUT, network.fetch(&request)).await,
      Ok(Ok(_))
    )
  }

  /// Poll `url` every `every` and publish the result.
  pub fn spawn_probe(
    self: &Arc<Self>,
    network: Arc<dyn Network>,
    url: Url,
    every: Duration,
  ) -> JoinHandle<()> {
    let connectivity = Arc::clone(self);
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(every);
      loop {
        interval.tick().await;
        let online = Self::probe(network.as_ref(), &url).await;
        if !online && connectivity.is_online() {
          info!("Connection lost");
        }
        connectivity.set_online(online);
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Response;
  use crate::testing::MockNetwork;

  #[test]
  fn test_transition_detection() {
    let connectivity = Connectivity::new(false);
    let rx = connectivity.subscribe();

    assert!(connectivity.set_online(true));
    assert!(*rx.borrow());
    assert!(!connectivity.set_online(true));
    assert!(!connectivity.set_online(false));
    assert!(!connectivity.is_online());
  }

  #[tokio::test]
  async fn test_probe_any_status_is_online() {
    let network = MockNetwork::new();
    network.respond("/rest/v1/", Response::new(401, ""));
    let url = Url::parse("https://xyz.supabase.co/rest/v1/").unwrap();
    assert!(Connectivity::probe(network.as_ref(), &url).await);

    network.set_online(false);
    assert!(!Connectivity::probe(network.as_ref(), &url).await);
  }

  #[tokio::test]
  async fn test_spawned_probe_publishes_state() {
    let network = MockNetwork::new();
    let connectivity = Arc::new(Connectivity::new(false));
    let mut rx = connectivity.subscribe();
    let url = Url::parse("https://xyz.supabase.co/rest/v1/").unwrap();

    let handle = connectivity.spawn_probe(network, url, Duration::from_millis(10));
    tokio::time::timeout(Duration::from_secs(1), rx.changed())
      .await
      .unwrap()
      .unwrap();
    assert!(*rx.borrow());
    handle.abort();
  }
}
