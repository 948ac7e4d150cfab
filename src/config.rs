use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::DOCUMENTS_BUCKET;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  pub auth: AuthConfig,
  /// Custom title for header (defaults to the backend host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub downloads: DownloadsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL, e.g. https://abc.supabase.co
  pub url: String,
  /// Storage bucket holding document files
  #[serde(default = "default_bucket")]
  pub bucket: String,
}

fn default_bucket() -> String {
  DOCUMENTS_BUCKET.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
  pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadsConfig {
  pub dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./classdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/classdesk/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if p.exists() => p.to_path_buf(),
      Some(p) => return Err(eyre!("Config file not found: {}", p.display())),
      None => Self::find_config_file().ok_or_else(|| {
        eyre!(
          "No configuration file found. Create one at ~/.config/classdesk/config.yaml\n\
           or start with --demo to try the dashboard without a backend."
        )
      })?,
    };
    Self::load_from_path(&path)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("classdesk.yaml");
    if local.exists() {
      return Some(local);
    }
    dirs::config_dir()
      .map(|dir| dir.join("classdesk").join("config.yaml"))
      .filter(|path| path.exists())
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Where downloaded documents are saved
  pub fn download_dir(&self) -> PathBuf {
    self
      .downloads
      .dir
      .clone()
      .or_else(dirs::download_dir)
      .unwrap_or_else(|| PathBuf::from("."))
  }

  /// Get the project's public API key from environment variables.
  ///
  /// Checks CLASSDESK_ANON_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_anon_key() -> Result<String> {
    std::env::var("CLASSDESK_ANON_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set CLASSDESK_ANON_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Get the account password from CLASSDESK_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("CLASSDESK_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set CLASSDESK_PASSWORD environment variable."))
  }
}
