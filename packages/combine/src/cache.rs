//! On-disk cache of the finished world tree.
//!
//! Each artifact is a `MessagePack` blob named by the SHA-256 of its cache
//! key. A blob that exists is considered fresh; delete it (or pass
//! `--rebuild`) to recompute.

use std::path::{Path, PathBuf};

use covid_atlas_region_models::Region;
use sha2::{Digest, Sha256};

use crate::CombineError;

/// Environment variable overriding the default cache directory.
pub const CACHE_DIR_VAR: &str = "COVID_ATLAS_CACHE_DIR";

/// Cache directory under `$HOME` when no override is set.
const DEFAULT_DIR_NAME: &str = "covid_cache";

/// A directory of cached world trees.
#[derive(Debug, Clone)]
pub struct AtlasCache {
    dir: PathBuf,
}

impl AtlasCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$COVID_ATLAS_CACHE_DIR`, else `$HOME/covid_cache`, else
    /// `covid_cache` in the working directory.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(CACHE_DIR_VAR) {
            return PathBuf::from(dir);
        }
        std::env::var_os("HOME").map_or_else(
            || PathBuf::from(DEFAULT_DIR_NAME),
            |home| PathBuf::from(home).join(DEFAULT_DIR_NAME),
        )
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact for `key` lives.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("world-{digest}.msgpack"))
    }

    /// Loads the cached world for `key`, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`CombineError::Io`] if the file exists but cannot be read,
    /// or [`CombineError::Decode`] if it is not a valid world tree.
    pub fn load(&self, key: &str) -> Result<Option<Region>, CombineError> {
        let path = self.path_for(key);
        if !path.exists() {
            log::debug!("No cached world at {}", path.display());
            return Ok(None);
        }
        log::info!("Loading cached world: {}", path.display());
        let bytes = std::fs::read(&path).map_err(|e| CombineError::io(&path, e))?;
        Ok(Some(rmp_serde::from_slice(&bytes)?))
    }

    /// Writes `world` for `key`, replacing any previous artifact.
    ///
    /// The blob is written to a temporary file first and then renamed, so
    /// an interrupted run never leaves a truncated artifact behind.
    ///
    /// # Errors
    ///
    /// Returns [`CombineError::Encode`] if serialization fails, or
    /// [`CombineError::Io`] if the directory or file cannot be written.
    pub fn store(&self, key: &str, world: &Region) -> Result<PathBuf, CombineError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CombineError::io(&self.dir, e))?;

        let path = self.path_for(key);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self.dir.join(format!("tmp.{file_name}"));

        let bytes = rmp_serde::to_vec_named(world)?;
        std::fs::write(&tmp_path, &bytes).map_err(|e| CombineError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| CombineError::io(&path, e))?;

        log::info!("Saved cached world: {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Deletes the artifact for `key`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`CombineError::Io`] if the file exists but cannot be removed.
    pub fn remove(&self, key: &str) -> Result<bool, CombineError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| CombineError::io(&path, e))?;
        log::info!("Removed cached world: {}", path.display());
        Ok(true)
    }
}
