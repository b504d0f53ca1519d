//! Data-driven route table: which cache and strategy serve which requests.

use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::http::{Destination, Request, Response};

/// Predicate selecting the requests a rule applies to.
#[derive(Debug, Clone)]
pub enum Matcher {
  /// Path equals one of the entries
  ExactPath(Vec<String>),
  /// Top-level document loads
  Navigation,
  Destination(Destination),
  /// Path contains one of the substrings
  PathContains(Vec<String>),
  Any,
}

impl Matcher {
  pub fn matches(&self, request: &Request) -> bool {
    match self {
      Self::ExactPath(paths) => paths.iter().any(|p| p == request.path()),
      Self::Navigation => request.is_navigation(),
      Self::Destination(dest) => request.destination == *dest,
      Self::PathContains(parts) => parts.iter().any(|p| request.path().contains(p.as_str())),
      Self::Any => true,
    }
  }
}

/// Which network responses may be written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePolicy {
  /// Any 2xx
  Success,
  /// HTTP 200 only
  OkOnly,
}

impl StorePolicy {
  pub fn should_store(&self, response: &Response) -> bool {
    match self {
      Self::Success => response.is_success(),
      Self::OkOnly => response.is_ok(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Serve from cache when present, otherwise fetch and populate.
  CacheFirst(StorePolicy),
  /// Fetch first; on error (or timeout, when set) serve the cached copy.
  NetworkFirst { timeout: Option<Duration> },
  /// Fetch without caching; on error go straight to the rule's fallback.
  NetworkOnly,
  /// Serve cached copy immediately and refresh it in the background.
  StaleWhileRevalidate,
}

/// Last resort once both network and the rule's cache have nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
  /// Synthetic 503
  None,
  /// Cached offline document, else 503
  OfflineDocument,
  /// For navigations: cached root document, then offline document, else 503
  ShellDocument,
}

#[derive(Debug, Clone)]
pub struct RouteRule {
  pub name: String,
  pub cache: String,
  pub matcher: Matcher,
  pub strategy: Strategy,
  pub fallback: Fallback,
}

/// Ordered route table; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct RouterConfig {
  pub origin: Url,
  pub rules: Vec<RouteRule>,
  pub root_document: String,
  pub offline_document: String,
}

impl RouterConfig {
  /// Build the default route table from configuration.
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server url '{}': {}", config.server.url, e))?;
    let caches = &config.caches;

    let rules = vec![
      RouteRule {
        name: "app-shell".to_string(),
        cache: caches.static_cache(),
        matcher: Matcher::ExactPath(caches.shell_assets.clone()),
        strategy: Strategy::CacheFirst(StorePolicy::Success),
        fallback: Fallback::ShellDocument,
      },
      RouteRule {
        name: "navigation".to_string(),
        cache: caches.dynamic_cache(),
        matcher: Matcher::Navigation,
        strategy: Strategy::NetworkOnly,
        fallback: Fallback::ShellDocument,
      },
      RouteRule {
        name: "images".to_string(),
        cache: caches.images_cache(),
        matcher: Matcher::Destination(Destination::Image),
        strategy: Strategy::CacheFirst(StorePolicy::OkOnly),
        fallback: Fallback::None,
      },
      RouteRule {
        name: "student-api".to_string(),
        cache: caches.student_cache(),
        matcher: Matcher::PathContains(caches.critical_api.clone()),
        strategy: Strategy::NetworkFirst {
          timeout: Some(caches.network_timeout()),
        },
        fallback: Fallback::None,
      },
      RouteRule {
        name: "api".to_string(),
        cache: caches.dynamic_cache(),
        matcher: Matcher::PathContains(caches.api.clone()),
        strategy: Strategy::NetworkFirst { timeout: None },
        fallback: Fallback::OfflineDocument,
      },
      RouteRule {
        name: "default".to_string(),
        cache: caches.dynamic_cache(),
        matcher: Matcher::Any,
        strategy: Strategy::StaleWhileRevalidate,
        fallback: Fallback::None,
      },
    ];

    Ok(Self {
      origin,
      rules,
      root_document: caches.root_document.clone(),
      offline_document: caches.offline_document.clone(),
    })
  }

  pub fn classify(&self, request: &Request) -> Option<&RouteRule> {
    self.rules.iter().find(|rule| rule.matcher.matches(request))
  }

  /// Resolve a path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }
}
