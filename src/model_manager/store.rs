//! Model Store - the on-disk cache of downloaded model files

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use super::types::LocalModelInfo;

/// Suffix of in-flight download files; never listed as models
pub const TEMP_SUFFIX: &str = ".download";

/// Filesystem-backed registry of cached models.
///
/// Nothing is cached in memory: every call looks at the directory, so files
/// committed by a concurrent download show up on the next read.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    pub fn new(models_dir: PathBuf) -> Self {
        Self { models_dir }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.models_dir)
            .map_err(|e| CoreError::io("Failed to create models directory", e))
    }

    /// Sorted file names of cached models; empty when the directory is absent
    pub fn list_models(&self) -> Result<Vec<String>> {
        Ok(self
            .local_models_info()?
            .into_iter()
            .map(|info| info.name)
            .collect())
    }

    /// Name, path and size of every cached model, sorted by name
    pub fn local_models_info(&self) -> Result<Vec<LocalModelInfo>> {
        let mut models = Vec::new();

        if !self.models_dir.exists() {
            return Ok(models);
        }

        let entries = std::fs::read_dir(&self.models_dir)
            .map_err(|e| CoreError::io("Failed to read models directory", e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else { continue };
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            models.push(LocalModelInfo {
                name,
                path,
                size_bytes: metadata.len(),
            });
        }

        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    /// Path of a cached model, checked for existence on every call
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let safe = safe_file_name(name)?;
        let path = self.models_dir.join(safe);
        path.is_file().then_some(path)
    }

    /// Delete a cached model; deleting a missing model is not an error
    /// Delete a cached model; returns the path it lived at
    pub fn remove(&self, name: &str) -> Result<PathBuf> {
        let safe = safe_file_name(name)
            .ok_or_else(|| CoreError::InvalidArgument(format!("Invalid model name: {:?}", name)))?;
        let path = self.models_dir.join(safe);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| CoreError::io("Failed to delete model", e))?;
            log::info!("Deleted model {}", path.display());
        }
        Ok(path)
    }

    /// Remove temp files left behind by a download that never finished.
    /// Only call while no download is running.
    pub fn sweep_temp_files(&self) -> Result<usize> {
        if !self.models_dir.exists() {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&self.models_dir)
            .map_err(|e| CoreError::io("Failed to read models directory", e))?;

        let mut removed = 0;
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().ends_with(TEMP_SUFFIX) {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Failed to remove stale temp file {:?}: {}", entry.path(), e),
                }
            }
        }
        Ok(removed)
    }

    /// Which model should be selected: the saved one if it is still cached,
    /// else the fallback if cached, else nothing.
    pub fn current_selection(
        saved_name: Option<&str>,
        fallback_name: Option<&str>,
        available: &[String],
    ) -> Option<String> {
        let is_available = |name: &&str| available.iter().any(|a| a == name);
        saved_name
            .filter(is_available)
            .or_else(|| fallback_name.filter(is_available))
            .map(str::to_string)
    }
}

/// Strip any directory components; `None` when nothing usable remains
pub fn safe_file_name(name: &str) -> Option<String> {
    let candidate = Path::new(name.trim()).file_name()?.to_string_lossy().trim().to_string();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        None
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_models_missing_dir() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));
        assert!(store.list_models().unwrap().is_empty());
    }

    #[test]
    fn test_list_models_sorted_files_only() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("zeta.gguf"), b"z").unwrap();
        std::fs::write(dir.path().join("alpha.gguf"), b"a").unwrap();
        std::fs::write(dir.path().join("alpha-1234.download"), b"partial").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(store.list_models().unwrap(), vec!["alpha.gguf", "zeta.gguf"]);
    }

    #[test]
    fn test_resolve_checks_existence_each_time() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        assert!(store.resolve("m.gguf").is_none());

        std::fs::write(dir.path().join("m.gguf"), b"m").unwrap();
        assert_eq!(store.resolve("m.gguf"), Some(dir.path().join("m.gguf")));

        store.remove("m.gguf").unwrap();
        assert!(store.resolve("m.gguf").is_none());
        store.remove("m.gguf").unwrap();
    }

    #[test]
    fn test_resolve_ignores_directory_components() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("m.gguf"), b"m").unwrap();
        assert!(store.resolve("../../m.gguf").is_some());
        assert!(store.resolve("..").is_none());
        assert!(store.remove("").is_err());

        let removed = store.remove("../m.gguf").unwrap();
        assert_eq!(removed, dir.path().join("m.gguf"));
        assert!(!removed.exists());
    }

    #[test]
    fn test_current_selection_tie_break() {
        let available = vec!["a.gguf".to_string(), "b.gguf".to_string()];
        assert_eq!(
            ModelStore::current_selection(Some("b.gguf"), Some("a.gguf"), &available),
            Some("b.gguf".to_string())
        );
        assert_eq!(
            ModelStore::current_selection(Some("gone.gguf"), Some("a.gguf"), &available),
            Some("a.gguf".to_string())
        );
        assert_eq!(ModelStore::current_selection(Some("gone.gguf"), Some("x.gguf"), &available), None);
        assert_eq!(ModelStore::current_selection(None, None, &available), None);
    }

    #[test]
    fn test_sweep_temp_files() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("m.gguf"), b"m").unwrap();
        std::fs::write(dir.path().join("m-1.download"), b"p").unwrap();

        assert_eq!(store.sweep_temp_files().unwrap(), 1);
        assert_eq!(store.list_models().unwrap(), vec!["m.gguf"]);
    }
}
