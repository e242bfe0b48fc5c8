//! # Disk Cache Policy

use anyhow::{Context, bail};
use burn::config::Config;
use burn::data::network::downloader;
use std::fs::{File, remove_file};
use std::io::Write;
use std::path::PathBuf;

/// Disk cache policy.
///
/// Resources live under ``{root_dir}/{root_cache_key}/...``; ``root_dir``
/// defaults to ``~/.cache``.
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Key for the root cache directory.
    #[config(default = "\"fcn\".to_string()")]
    pub root_cache_key: String,

    /// Explicit parent of the root cache directory.
    #[config(default = "None")]
    pub root_dir: Option<PathBuf>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, does not create it.
    pub fn base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let parent = match &self.root_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .context("no home directory for the weights cache")?
                .join(".cache"),
        };
        Ok(parent.join(&self.root_cache_key))
    }

    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, creates it.
    pub fn ensure_base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let dir = self.base_cache_dir()?;
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Map a resource key to a cache path.
    ///
    /// Does not ensure that the path (or any of the parents) exist.
    pub fn resource_to_path(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        if resource_key.is_empty() {
            bail!("empty resource key");
        }
        let path = self.base_cache_dir()?;
        Ok(resource_key.iter().fold(path, |acc, s| acc.join(s)))
    }

    /// Map a resource key to a cache path and ensure the parent directory exists.
    pub fn ensure_resource_parent_dir(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_to_path(resource_key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Fetch a resource to the cache.
    ///
    /// Read-through: an existing cache file is returned without a download.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let cache_file_path = self.ensure_resource_parent_dir(resource)?;
        try_cache_download_to_path(url, cache_file_path)
    }
}

/// Download a URL resource to a given path.
///
/// If the path already exists, does nothing.
///
/// # Returns
///
/// The cache path.
pub fn try_cache_download_to_path(
    url: &str,
    cache_file_path: PathBuf,
) -> anyhow::Result<PathBuf> {
    if cache_file_path.exists() {
        tracing::debug!(path = %cache_file_path.display(), "cache hit");
        return Ok(cache_file_path);
    }

    let file_name = cache_file_path
        .file_name()
        .context("cache path has no file name")?
        .to_string_lossy()
        .to_string();

    tracing::info!(url, path = %cache_file_path.display(), "downloading");
    let bytes = downloader::download_file_as_bytes(url, &file_name);

    let mut output_file = File::create(&cache_file_path)?;
    if let Err(err) = output_file.write_all(&bytes) {
        drop(output_file);
        remove_file(&cache_file_path)?;
        bail!("failed to write {}: {}", cache_file_path.display(), err);
    }

    Ok(cache_file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new().with_root_dir(Some(tmp.path().to_path_buf()));

        assert_eq!(cache.base_cache_dir().unwrap(), tmp.path().join("fcn"));

        let key = vec!["weights".to_string(), "abc.pth".to_string()];
        let path = cache.resource_to_path(&key).unwrap();
        assert_eq!(path, tmp.path().join("fcn").join("weights").join("abc.pth"));
        assert!(!path.parent().unwrap().exists());

        let path = cache.ensure_resource_parent_dir(&key).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());

        assert!(cache.resource_to_path(&[]).is_err());
    }

    #[test]
    fn test_fetch_resource_cache_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new()
            .with_root_cache_key("test".to_string())
            .with_root_dir(Some(tmp.path().to_path_buf()));

        let key = vec!["weights".to_string(), "present.pth".to_string()];
        let path = cache.ensure_resource_parent_dir(&key).unwrap();
        std::fs::write(&path, b"weights").unwrap();

        // An unreachable URL is never contacted on a hit.
        let fetched = cache
            .fetch_resource("http://invalid.invalid/present.pth", &key)
            .unwrap();
        assert_eq!(fetched, path);
        assert_eq!(std::fs::read(fetched).unwrap(), b"weights");
    }

    #[test]
    fn test_config_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = DiskCacheConfig::new().with_root_dir(Some(tmp.path().join("cache")));

        let file = tmp.path().join("cache.json");
        config.save(&file).unwrap();
        let loaded = DiskCacheConfig::load(&file).unwrap();
        assert_eq!(loaded.root_dir, config.root_dir);
        assert_eq!(loaded.root_cache_key, "fcn");
    }
}
