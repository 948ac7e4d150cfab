//! Local file handling: reading uploads, saving downloads, opening previews.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// A file picked for upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpload {
  /// Original file name, used to derive the stored extension
  pub name: String,
  pub bytes: Vec<u8>,
}

impl FileUpload {
  pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      bytes,
    }
  }

  /// Read a file from disk.
  pub async fn read(path: &Path) -> Result<Self> {
    let bytes = tokio::fs::read(path)
      .await
      .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .ok_or_else(|| eyre!("Not a file: {}", path.display()))?;
    Ok(Self { name, bytes })
  }

  /// Extension as stored: the text after the last dot, or the whole name.
  pub fn extension(&self) -> &str {
    self.name.rsplit('.').next().unwrap_or(&self.name)
  }
}

/// Turn a document title into a safe file name.
pub fn download_file_name(title: &str) -> String {
  let cleaned: String = title
    .trim()
    .chars()
    .map(|c| match c {
      '/' | '\\' | ':' | '\0' => '_',
      c => c,
    })
    .collect();
  if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
    "document".to_string()
  } else {
    cleaned
  }
}

/// Write downloaded bytes into `dir`, named after the document title.
pub async fn save_download(dir: &Path, title: &str, bytes: &[u8]) -> Result<PathBuf> {
  tokio::fs::create_dir_all(dir)
    .await
    .map_err(|e| eyre!("Failed to create {}: {}", dir.display(), e))?;
  let path = dir.join(download_file_name(title));
  tokio::fs::write(&path, bytes)
    .await
    .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
  info!(path = %path.display(), "Saved download");
  Ok(path)
}

/// Open a URL with the platform's default handler.
pub fn open_in_browser(url: &str) -> Result<()> {
  let opener = if cfg!(target_os = "macos") {
    "open"
  } else if cfg!(target_os = "windows") {
    "explorer"
  } else {
    "xdg-open"
  };
  std::process::Command::new(opener)
    .arg(url)
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::null())
    .spawn()
    .map_err(|e| eyre!("Failed to launch {}: {}", opener, e))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extension() {
    assert_eq!(FileUpload::new("a.pdf", vec![]).extension(), "pdf");
    assert_eq!(FileUpload::new("notes.final.txt", vec![]).extension(), "txt");
    assert_eq!(FileUpload::new("README", vec![]).extension(), "README");
  }

  #[test]
  fn test_download_file_name() {
    assert_eq!(download_file_name("Report"), "Report");
    assert_eq!(download_file_name("a/b\\c"), "a_b_c");
    assert_eq!(download_file_name("  "), "document");
    assert_eq!(download_file_name(".."), "document");
  }

  #[tokio::test]
  async fn test_read_and_save_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.pdf");
    tokio::fs::write(&source, b"%PDF").await.unwrap();

    let upload = FileUpload::read(&source).await.unwrap();
    assert_eq!(upload.name, "a.pdf");

    let saved = save_download(&dir.path().join("out"), "Report", &upload.bytes)
      .await
      .unwrap();
    assert_eq!(saved.file_name().unwrap(), "Report");
    assert_eq!(tokio::fs::read(saved).await.unwrap(), b"%PDF");
  }

  #[tokio::test]
  async fn test_read_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(FileUpload::read(&dir.path().join("missing.pdf")).await.is_err());
  }
}
