//! Hierarchical byte store
//!
//! Paths are `/`-separated and relative to the store root. `create_file` is
//! the primitive the secret store relies on for race safety: it must fail
//! with [`ClusterError::AlreadyExists`] when the target exists, and readers
//! must never observe a partially written file.

use crate::error::{ClusterError, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait PathStore: Send + Sync {
    /// Reads a file; [`ClusterError::NotFound`] if it does not exist
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Atomically creates a file, failing with
    /// [`ClusterError::AlreadyExists`] if it already exists
    async fn create_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Atomically creates or replaces a file
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Removes a file; [`ClusterError::NotFound`] if it does not exist
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Lists entry names directly below `path`, sorted. A missing directory
    /// lists as empty.
    async fn read_dir(&self, path: &str) -> Result<Vec<String>>;
}

/// Joins path segments with `/`, skipping empty ones
pub fn join(base: &str, name: &str) -> String {
    match (base.trim_end_matches('/'), name.trim_start_matches('/')) {
        ("", n) => n.to_string(),
        (b, "") => b.to_string(),
        (b, n) => format!("{}/{}", b, n),
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Local filesystem store
///
/// Files are written to a hidden temporary sibling first and then moved
/// into place: by hard link for exclusive creates (the link fails if the
/// target exists, also across processes) and by rename for replacements.
#[derive(Debug, Clone)]
pub struct FsPathStore {
    root: PathBuf,
}

impl FsPathStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(ClusterError::config(format!(
                    "path may not contain relative segments: {:?}",
                    path
                )));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    /// Writes `data` to a fresh hidden file next to `target`
    async fn write_temp(&self, path: &str, target: &Path, data: &[u8]) -> Result<PathBuf> {
        let parent = target
            .parent()
            .ok_or_else(|| ClusterError::config(format!("invalid path: {:?}", path)))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ClusterError::storage(path, e))?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClusterError::config(format!("invalid path: {:?}", path)))?;
        let suffix: u64 = rand::thread_rng().r#gen();
        let temp = parent.join(format!(".{}.tmp-{:016x}", file_name, suffix));

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .await
            .map_err(|e| ClusterError::storage(path, e))?;

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(ClusterError::storage(path, e));
        }

        Ok(temp)
    }
}

#[async_trait]
impl PathStore for FsPathStore {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        match fs::read(&target).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ClusterError::NotFound(path.to_string()))
            }
            Err(e) => Err(ClusterError::storage(path, e)),
        }
    }

    async fn create_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let temp = self.write_temp(path, &target, data).await?;

        let linked = fs::hard_link(&temp, &target).await;
        let _ = fs::remove_file(&temp).await;

        match linked {
            Ok(()) => {
                tracing::debug!("Created {}", target.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(ClusterError::AlreadyExists(path.to_string()))
            }
            Err(e) => Err(ClusterError::storage(path, e)),
        }
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let temp = self.write_temp(path, &target, data).await?;

        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(ClusterError::storage(path, e));
        }

        tracing::debug!("Wrote {}", target.display());
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ClusterError::NotFound(path.to_string()))
            }
            Err(e) => Err(ClusterError::storage(path, e)),
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.resolve(path)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ClusterError::storage(path, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ClusterError::storage(path, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if !is_hidden(name) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

/// In-process store, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryPathStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryPathStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map is still consistent: every mutation is a single insert/remove
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn normalize(path: &str) -> String {
        path.split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn len(&self) -> usize {
        self.files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }
}

#[async_trait]
impl PathStore for MemoryPathStore {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.files()
            .get(&Self::normalize(path))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(path.to_string()))
    }

    async fn create_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut files = self.files();
        let key = Self::normalize(path);
        if files.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(path.to_string()));
        }
        files.insert(key, data.to_vec());
        Ok(())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.files().insert(Self::normalize(path), data.to_vec());
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.files()
            .remove(&Self::normalize(path))
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound(path.to_string()))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let dir = Self::normalize(path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut names: Vec<String> = self
            .files()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty() && !is_hidden(name))
            .map(str::to_string)
            .collect();

        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_join() {
        assert_eq!(join("", "config"), "config");
        assert_eq!(join("k8s.example.com/", "/secrets"), "k8s.example.com/secrets");
        assert_eq!(join("a", ""), "a");
    }

    #[tokio::test]
    async fn test_fs_create_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let store = FsPathStore::new(temp_dir.path());

        store.create_file("c/secrets/admin", b"first").await.unwrap();
        let err = store
            .create_file("c/secrets/admin", b"second")
            .await
            .unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(store.read_file("c/secrets/admin").await.unwrap(), b"first");
        assert_eq!(store.read_dir("c/secrets").await.unwrap(), vec!["admin"]);
    }

    #[tokio::test]
    async fn test_fs_missing_entries() {
        let temp_dir = tempdir().unwrap();
        let store = FsPathStore::new(temp_dir.path());

        assert!(store.read_file("nope").await.unwrap_err().is_not_found());
        assert!(store.remove_file("nope").await.unwrap_err().is_not_found());
        assert!(store.read_dir("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fs_write_replaces_and_remove() {
        let temp_dir = tempdir().unwrap();
        let store = FsPathStore::new(temp_dir.path());

        store.write_file("c/config", b"v1").await.unwrap();
        store.write_file("c/config", b"v2").await.unwrap();
        assert_eq!(store.read_file("c/config").await.unwrap(), b"v2");

        store.remove_file("c/config").await.unwrap();
        assert!(store.read_file("c/config").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_fs_rejects_parent_segments() {
        let temp_dir = tempdir().unwrap();
        let store = FsPathStore::new(temp_dir.path());

        let err = store.create_file("../escape", b"x").await.unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fs_concurrent_create_has_one_winner() {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(FsPathStore::new(temp_dir.path()));

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_file("race/target", &[i]).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(store.read_dir("race").await.unwrap(), vec!["target"]);
    }

    #[tokio::test]
    async fn test_memory_read_dir_lists_direct_children() {
        let store = MemoryPathStore::new();
        store.create_file("c/secrets/a", b"1").await.unwrap();
        store.create_file("c/secrets/b", b"2").await.unwrap();
        store.create_file("c/config", b"3").await.unwrap();
        store.create_file("other/config", b"4").await.unwrap();

        assert_eq!(store.read_dir("c").await.unwrap(), vec!["config", "secrets"]);
        assert_eq!(store.read_dir("c/secrets").await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.read_dir("").await.unwrap(), vec!["c", "other"]);
        assert!(
            store
                .create_file("c/secrets/a", b"x")
                .await
                .unwrap_err()
                .is_already_exists()
        );
    }
}
