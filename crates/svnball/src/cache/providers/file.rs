//! # File Store
//!
//! Keeps one JSON document per URL so every worker process sharing the
//! directory sees the same revision data.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use crate::cache::providers::RecordStore;
use crate::cache::types::RevisionRecord;
use crate::error::StoreResult;

const RECORD_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, url: &str) -> PathBuf {
        let hash = Sha256::digest(url.as_bytes());
        self.dir.join(format!("{hash:x}.{RECORD_EXTENSION}"))
    }

    async fn read_record(path: &Path) -> StoreResult<Option<RevisionRecord>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn get_or_create(&self, url: &str) -> StoreResult<RevisionRecord> {
        let path = self.record_path(url);
        if let Some(record) = Self::read_record(&path).await? {
            return Ok(record);
        }

        let record = RevisionRecord::new(url);
        self.write(&record).await?;
        debug!(url = %url, path = ?path, "Created revision record");
        Ok(record)
    }

    async fn write(&self, record: &RevisionRecord) -> StoreResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(&record.url);
        let json = serde_json::to_vec_pretty(record)?;

        // Readers in other processes must never see a half-written record
        let temp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&temp_path, &json).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            warn!(from = ?temp_path, to = ?path, error = %e, "Failed to rename record file");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn urls(&self) -> StoreResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut urls = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(record)) => urls.push(record.url),
                Ok(None) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable record"),
            }
        }
        urls.sort();
        Ok(urls)
    }
}
