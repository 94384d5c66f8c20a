use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::memory::{MemoryStore, Snapshot};
use super::{DefinitionRepository, ExecutionLog, InstanceRepository};
use crate::error::Result;
use crate::process::{ProcessDefinition, ProcessInstance, StepEvent};

/// A JSON snapshot on disk, read through a [`MemoryStore`].
///
/// Every write holds an exclusive lock on `<path>.lock`, re-reads the
/// snapshot, applies the change to the file contents and replaces the file
/// by renaming a temporary sibling. Handles in other processes therefore see
/// each other's writes, and revision checks run against what is on disk.
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    // Serializes refreshes of `inner` within this handle.
    gate: Mutex<()>,
}

impl FileStore {
    /// Open the snapshot at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = read_snapshot(&path).await?;
        Ok(Self {
            inner: MemoryStore::from_snapshot(snapshot),
            path,
            gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Replace the in-memory copy with the file contents.
    async fn refresh(&self) -> Result<()> {
        self.inner.replace(read_snapshot(&self.path).await?).await;
        Ok(())
    }

    // The lock is released when the returned handle is dropped.
    async fn acquire(&self) -> Result<File> {
        let path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(file)
    }

    /// Run `op` against the current file contents.
    async fn read<T: Send>(&self, op: impl Future<Output = Result<T>> + Send) -> Result<T> {
        let _gate = self.gate.lock().await;
        self.read(op).await
    }

    /// Run `op` under the file lock, between a refresh and a flush.
    async fn write<T: Send>(&self, op: impl Future<Output = Result<T>> + Send) -> Result<T> {
        let _gate = self.gate.lock().await;
        let _lock = self.acquire().await?;
        self.refresh().await?;
        let out = op.await?;
        self.flush().await?;
        Ok(out)
    }

    async fn flush(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.inner.snapshot().await)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;
        tracing::debug!(path = %self.path.display(), "state flushed");
        Ok(())
    }
}

async fn read_snapshot(path: &Path) -> Result<Snapshot> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str::<Snapshot>(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DefinitionRepository for FileStore {
    async fn active(&self, key: &str) -> Result<Arc<ProcessDefinition>> {
        self.read(self.inner.active(key)).await
    }

    async fn get(&self, key: &str, version: u32) -> Result<Arc<ProcessDefinition>> {
        self.read(self.inner.get(key, version)).await
    }

    async fn publish(&self, definition: ProcessDefinition) -> Result<Arc<ProcessDefinition>> {
        self.write(self.inner.publish(definition)).await
    }

    async fn list(&self) -> Result<Vec<Arc<ProcessDefinition>>> {
        self.read(DefinitionRepository::list(&self.inner)).await
    }
}

#[async_trait]
impl InstanceRepository for FileStore {
    async fn insert(&self, instance: &ProcessInstance) -> Result<()> {
        self.write(self.inner.insert(instance)).await
    }

    async fn load(&self, id: Uuid) -> Result<ProcessInstance> {
        self.read(self.inner.load(id)).await
    }

    async fn save(
        &self,
        instance: &ProcessInstance,
        expected_revision: u64,
    ) -> Result<ProcessInstance> {
        self.write(self.inner.save(instance, expected_revision)).await
    }

    async fn list(&self) -> Result<Vec<ProcessInstance>> {
        self.read(InstanceRepository::list(&self.inner)).await
    }
}

#[async_trait]
impl ExecutionLog for FileStore {
    async fn append(&self, events: &[StepEvent]) -> Result<()> {
        self.write(self.inner.append(events)).await
    }

    async fn events(&self) -> Result<Vec<StepEvent>> {
        self.read(self.inner.events()).await
    }

    async fn events_for(&self, instance_id: Uuid) -> Result<Vec<StepEvent>> {
        self.read(self.inner.events_for(instance_id)).await
    }
}
