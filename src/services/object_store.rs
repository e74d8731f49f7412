//! Object store client.
//!
//! [`ObjectStore`] is the read-only view this service needs of a blob store:
//! prefix listing, existence checks and full downloads. [`LocalObjectStore`]
//! serves objects from a directory tree where the key is the relative path,
//! e.g. `base_path/video-metadata/abc123.json`.

use anyhow::{Context, bail};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Async object storage contract.
pub trait ObjectStore: Send + Sync + 'static {
    /// Every key under `prefix`, fully drained and sorted.
    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<String>>>;

    /// Whether an object exists at `key`.
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<bool>>;

    /// Read the full object at `key`.
    fn download<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Bytes>>;

    /// Cheap reachability check backing `/readyz`.
    fn ping(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Objects stored as plain files beneath `base_path`.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a key onto a path below `base_path`, rejecting anything that could
    /// escape it.
    fn object_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            bail!("invalid object key length for `{key}`");
        }
        if key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            bail!("invalid object key `{key}`");
        }
        Ok(self.base_path.join(key))
    }

    /// Directory to start walking from for `prefix`: the part up to the last `/`.
    fn listing_root(&self, prefix: &str) -> anyhow::Result<PathBuf> {
        match prefix.rfind('/') {
            Some(pos) => self.object_path(&prefix[..pos]),
            None => Ok(self.base_path.clone()),
        }
    }

    async fn walk(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let root = self.listing_root(prefix)?;
        let mut keys = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("listing {}", dir.display()));
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("listing {}", dir.display()))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .with_context(|| format!("inspecting {}", path.display()))?;
                // Symlinked files are listed like `download` reads them;
                // symlinked directories are not descended into.
                let is_file = if file_type.is_symlink() {
                    match fs::metadata(&path).await {
                        Ok(meta) => meta.is_file(),
                        Err(err) if err.kind() == ErrorKind::NotFound => false,
                        Err(err) => {
                            return Err(err)
                                .with_context(|| format!("inspecting {}", path.display()));
                        }
                    }
                } else {
                    file_type.is_file()
                };

                if file_type.is_dir() {
                    pending.push(path);
                } else if is_file {
                    if let Some(key) = self.key_for(&path) {
                        if key.starts_with(prefix) {
                            keys.push(key);
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Inverse of [`Self::object_path`]; `None` for non UTF-8 names.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }
}

impl ObjectStore for LocalObjectStore {
    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(self.walk(prefix))
    }

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            match fs::metadata(&path).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                Err(err) => Err(err).with_context(|| format!("checking {}", path.display())),
            }
        })
    }

    fn download<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Bytes>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            let bytes = fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(Bytes::from(bytes))
        })
    }

    fn ping(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let meta = fs::metadata(&self.base_path)
                .await
                .with_context(|| format!("inspecting {}", self.base_path.display()))?;
            if !meta.is_dir() {
                bail!("{} is not a directory", self.base_path.display());
            }
            Ok(())
        })
    }
}
