//! Core types for the response caches.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::http::{Request, Response};

/// Stable storage key of a request (method + full URL).
pub fn request_key(request: &Request) -> String {
  let input = format!("{} {}", request.method, request.url);

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

/// Result of routing a request, including where the response came from.
#[derive(Debug, Clone)]
pub struct Served {
  /// The response handed back to the caller
  pub response: Response,
  /// Where the response came from
  pub source: ServeSource,
  /// Name of the matching route rule (None for pass-through)
  pub rule: Option<String>,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ServeSource::Network,
      rule: None,
      cached_at: None,
    }
  }

  pub fn from_cache(response: Response, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ServeSource::Cache,
      rule: None,
      cached_at: Some(cached_at),
    }
  }

  /// Offline mode - network unavailable and the designated fallback is served.
  pub fn offline(response: Response) -> Self {
    Self {
      response,
      source: ServeSource::OfflineFallback,
      rule: None,
      cached_at: None,
    }
  }

  pub fn pass_through(response: Response) -> Self {
    Self {
      response,
      source: ServeSource::PassThrough,
      rule: None,
      cached_at: None,
    }
  }

  pub(crate) fn with_rule(mut self, rule: &str) -> Self {
    self.rule = Some(rule.to_string());
    self
  }
}

/// Terminal state of a routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
  /// Fresh data from network
  Network,
  /// Stored response from a named cache
  Cache,
  /// Root/offline document or synthetic 503
  OfflineFallback,
  /// Not intercepted (non-GET)
  PassThrough,
}

impl std::fmt::Display for ServeSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::OfflineFallback => "offline-fallback",
      Self::PassThrough => "pass-through",
    };
    f.write_str(s)
  }
}
