//! Raw upload storage. The returned locator is what gets persisted on the
//! document record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use covenant_utils::{CovenantError, CovenantResult};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, document_id: Uuid, file_name: &str, bytes: &[u8]) -> CovenantResult<String>;
    async fn get(&self, locator: &str) -> CovenantResult<Vec<u8>>;
}

/// Stores each upload as `<root>/<document_id>/<file_name>`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, locator: &str) -> CovenantResult<PathBuf> {
        let relative = Path::new(locator);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(CovenantError::validation("storage_locator", "locator escapes storage root"));
        }
        Ok(self.root.join(relative))
    }
}

fn sanitize_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| if c.is_alphanumeric() || ".-_".contains(c) { c } else { '_' })
        .collect()
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, document_id: Uuid, file_name: &str, bytes: &[u8]) -> CovenantResult<String> {
        let locator = format!("{}/{}", document_id, sanitize_file_name(file_name));
        let path = self.resolve(&locator)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(%document_id, path = %path.display(), "Stored upload");
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> CovenantResult<Vec<u8>> {
        let path = self.resolve(locator)?;
        Ok(tokio::fs::read(&path).await?)
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, document_id: Uuid, file_name: &str, bytes: &[u8]) -> CovenantResult<String> {
        let locator = format!("memory://{}/{}", document_id, sanitize_file_name(file_name));
        self.blobs.write().await.insert(locator.clone(), bytes.to_vec());
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> CovenantResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(locator)
            .cloned()
            .ok_or_else(|| CovenantError::not_found(format!("blob {}", locator)))
    }
}
