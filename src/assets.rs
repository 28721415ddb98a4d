//! Guideline image lookup.
//!
//! Missing images are a display problem, not a session problem: callers get an
//! [`AssetError`] to render inline and the participant can still continue.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::AssetError;

/// Directory the guideline images are served from.
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

/// A guideline image reference, resolved against the asset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideImage {
    pub name: String,
    /// Inline error text when the image cannot be shown.
    pub error: Option<String>,
}

impl GuideImage {
    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }

    pub fn url(&self) -> String {
        format!("/assets/{}", self.name)
    }
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a plain file name inside the directory. Anything that could
    /// escape it (separators, `..`) is rejected.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, AssetError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.contains("..");
        if !valid {
            return Err(AssetError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Check that a guideline image exists and is a file.
    pub fn check(&self, name: &str) -> Result<PathBuf, AssetError> {
        let path = self.path_for(name)?;
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(AssetError::Unavailable {
                name: name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file"),
            }),
            Err(source) => Err(AssetError::Unavailable { name: name.to_string(), source }),
        }
    }

    /// Resolve every image of a condition for display.
    pub fn resolve_all(&self, names: &[String]) -> Vec<GuideImage> {
        names
            .iter()
            .map(|name| match self.check(name) {
                Ok(_) => GuideImage { name: name.clone(), error: None },
                Err(e) => {
                    warn!(image = %name, error = %e, "guideline image unavailable");
                    GuideImage { name: name.clone(), error: Some(e.to_string()) }
                }
            })
            .collect()
    }

    /// Read an image for serving.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.path_for(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| AssetError::Unavailable { name: name.to_string(), source })
    }
}

/// Content type by file extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
