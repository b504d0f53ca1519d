//! Scripted fakes for the network, server and reload seams.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::http::{Network, Request, Response};
use crate::store::{MutationId, PendingMutation, ScopeId};
use crate::sync::{Reloader, SyncTarget};

/// Network answering by URL path. Unknown paths get a 404.
pub struct MockNetwork {
  responses: Mutex<HashMap<String, Response>>,
  delays: Mutex<HashMap<String, Duration>>,
  calls: Mutex<HashMap<String, usize>>,
  last_requests: Mutex<HashMap<String, Request>>,
  online: AtomicBool,
}

impl MockNetwork {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      responses: Mutex::new(HashMap::new()),
      delays: Mutex::new(HashMap::new()),
      calls: Mutex::new(HashMap::new()),
      last_requests: Mutex::new(HashMap::new()),
      online: AtomicBool::new(true),
    })
  }

  pub fn respond(&self, path: &str, response: Response) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(path.to_string(), response);
  }

  pub fn delay(&self, path: &str, delay: Duration) {
    self.delays.lock().unwrap().insert(path.to_string(), delay);
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  pub fn calls(&self, path: &str) -> usize {
    self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
  }

  pub fn last_request(&self, path: &str) -> Option<Request> {
    self.last_requests.lock().unwrap().get(path).cloned()
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let path = request.path().to_string();
    *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;
    self
      .last_requests
      .lock()
      .unwrap()
      .insert(path.clone(), request.clone());

    let delay = self.delays.lock().unwrap().get(&path).copied();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    if !self.online.load(Ordering::SeqCst) {
      return Err(eyre!("Network unreachable"));
    }

    let response = self.responses.lock().unwrap().get(&path).cloned();
    Ok(response.unwrap_or_else(|| Response::new(404, "Not Found")))
  }
}

/// Server fake recording every accepted write.
pub struct RecordingTarget {
  sent: Mutex<Vec<PendingMutation>>,
  attempts: AtomicUsize,
  failing: Mutex<HashSet<String>>,
  fail_all: AtomicBool,
  delay: Mutex<Duration>,
}

impl RecordingTarget {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      sent: Mutex::new(Vec::new()),
      attempts: AtomicUsize::new(0),
      failing: Mutex::new(HashSet::new()),
      fail_all: AtomicBool::new(false),
      delay: Mutex::new(Duration::ZERO),
    })
  }

  /// Reject writes of one mutation.
  pub fn fail(&self, id: &MutationId) {
    self.failing.lock().unwrap().insert(id.to_string());
  }

  pub fn set_fail_all(&self, fail: bool) {
    self.fail_all.store(fail, Ordering::SeqCst);
  }

  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = delay;
  }

  pub fn sent(&self) -> Vec<PendingMutation> {
    self.sent.lock().unwrap().clone()
  }

  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl SyncTarget for RecordingTarget {
  async fn send(&self, mutation: &PendingMutation) -> Result<()> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    let delay = *self.delay.lock().unwrap();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }

    let rejected = self.fail_all.load(Ordering::SeqCst)
      || self
        .failing
        .lock()
        .unwrap()
        .contains(&mutation.id.to_string());
    if rejected {
      return Err(eyre!("Server rejected {}", mutation.id));
    }

    self.sent.lock().unwrap().push(mutation.clone());
    Ok(())
  }
}

#[derive(Default)]
pub struct CountingReloader {
  scopes: Mutex<Vec<ScopeId>>,
}

impl CountingReloader {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn reloads(&self) -> Vec<ScopeId> {
    self.scopes.lock().unwrap().clone()
  }
}

#[async_trait]
impl Reloader for CountingReloader {
  async fn reload(&self, scope: &ScopeId) -> Result<()> {
    self.scopes.lock().unwrap().push(scope.clone());
    Ok(())
  }
}
