use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  /// Default tenant (church) id used to partition local data
  pub scope: Option<String>,
  #[serde(default)]
  pub caches: CachesConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the hosted backend (e.g. "https://xyz.supabase.co")
  pub url: String,
  /// Table that receives lesson progress records
  #[serde(default = "default_progress_table")]
  pub progress_table: String,
}

fn default_progress_table() -> String {
  "aluno_progress".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
  /// Version suffix of every cache name; bumping it drops old caches on activation
  pub version: String,
  pub prefix: String,
  /// Paths served cache-first (exact match)
  pub shell_assets: Vec<String>,
  /// Path substrings of student portal endpoints (network-first with timeout)
  pub critical_api: Vec<String>,
  /// Path substrings of other API endpoints (network-first)
  pub api: Vec<String>,
  pub root_document: String,
  pub offline_document: String,
  pub network_timeout_ms: u64,
}

impl Default for CachesConfig {
  fn default() -> Self {
    Self {
      version: "v1".to_string(),
      prefix: "kerigma".to_string(),
      shell_assets: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/offline.html".to_string(),
        "/manifest.json".to_string(),
        "/favicon.ico".to_string(),
      ],
      critical_api: vec![
        "portal-aluno".to_string(),
        "aluno_".to_string(),
        "cursos".to_string(),
        "licoes".to_string(),
      ],
      api: vec![
        "/rest/v1/".to_string(),
        "/functions/v1/".to_string(),
        "/auth/v1/".to_string(),
      ],
      root_document: "/".to_string(),
      offline_document: "/offline.html".to_string(),
      network_timeout_ms: 3000,
    }
  }
}

impl CachesConfig {
  pub fn static_cache(&self) -> String {
    format!("{}-static-{}", self.prefix, self.version)
  }

  pub fn dynamic_cache(&self) -> String {
    format!("{}-dynamic-{}", self.prefix, self.version)
  }

  pub fn images_cache(&self) -> String {
    format!("{}-images-{}", self.prefix, self.version)
  }

  pub fn student_cache(&self) -> String {
    format!("{}-aluno-{}", self.prefix, self.version)
  }

  /// All cache names owned by the current version.
  pub fn cache_names(&self) -> Vec<String> {
    vec![
      self.static_cache(),
      self.dynamic_cache(),
      self.images_cache(),
      self.student_cache(),
    ]
  }

  pub fn network_timeout(&self) -> Duration {
    Duration::from_millis(self.network_timeout_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Periodic background-sync wake interval
  pub interval_secs: u64,
  /// Path polled to decide whether the server is reachable
  pub probe_path: String,
  pub probe_interval_secs: u64,
  /// Server-authoritative collections refreshed after a successful drain
  pub reload_paths: Vec<String>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: 300,
      probe_path: "/rest/v1/".to_string(),
      probe_interval_secs: 15,
      reload_paths: vec![
        "/rest/v1/aluno_progress".to_string(),
        "/rest/v1/cursos".to_string(),
      ],
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  pub cache_db: Option<PathBuf>,
  pub store_db: Option<PathBuf>,
}

impl StorageConfig {
  pub fn cache_db_path(&self) -> Result<PathBuf> {
    match &self.cache_db {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("cache.db")),
    }
  }

  pub fn store_db_path(&self) -> Result<PathBuf> {
    match &self.store_db {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("offline.db")),
    }
  }
}

/// Application data directory ($XDG_DATA_HOME/kerigma-offline).
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("kerigma-offline"))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kerigma.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kerigma-offline/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/kerigma-offline/config.yaml\n\
                 with at least `server: {{ url: https://<project>.supabase.co }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("kerigma.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kerigma-offline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    url::Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server url '{}': {}", config.server.url, e))?;
    Ok(config)
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks KERIGMA_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  /// Requests go out anonymously when neither is set.
  pub fn get_api_key() -> Option<String> {
    std::env::var("KERIGMA_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .ok()
  }
}
