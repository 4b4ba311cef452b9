use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use tokio::fs;

use super::{GatewayError, ObjectStoreGateway};
use crate::types::ObjectMeta;

/// A local directory posing as a bucket. Meant for development and demos: drop a PDF into the directory and the
/// polling engine picks it up exactly as it would from S3. The listing is flat; subdirectories are ignored.
pub struct FilesystemGateway {
    dir: PathBuf,
}

impl FilesystemGateway {
    /// Creates the directory if it does not exist yet.
    pub async fn new<P: Into<PathBuf>>(dir: P) -> Result<Self, GatewayError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            GatewayError::Transport(format!("Local bucket directory {} cannot be created: {e}", dir.display()))
        })?;
        debug!("📦 Local bucket directory ready at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ObjectStoreGateway for FilesystemGateway {
    async fn list_objects(&self) -> Result<Vec<ObjectMeta>, GatewayError> {
        let mut objects = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| GatewayError::Transport(format!("Listing {} failed: {e}", self.dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GatewayError::Transport(format!("Listing {} failed: {e}", self.dir.display())))?
        {
            let Ok(metadata) = entry.metadata().await else { continue };
            if !metadata.is_file() {
                continue;
            }
            let Some(key) = entry.file_name().to_str().map(str::to_string) else { continue };
            let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
            objects.push(ObjectMeta { key, size: metadata.len() as i64, last_modified, etag: None });
        }
        Ok(objects)
    }

    async fn fetch_object(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        // Keys come straight out of our own listing, but cheap to keep honest.
        if key.contains('/') || key.contains("..") {
            return Err(GatewayError::NotFound(key.to_string()));
        }
        match fs::read(self.dir.join(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(GatewayError::NotFound(key.to_string())),
            Err(e) => Err(GatewayError::Transport(format!("Reading '{key}' failed: {e}"))),
        }
    }

    async fn check_connectivity(&self) -> Result<(), GatewayError> {
        fs::read_dir(&self.dir)
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::Transport(format!("Local bucket {} is not readable: {e}", self.dir.display())))
    }

    fn bucket(&self) -> &str {
        self.dir.to_str().unwrap_or("local")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gig_fs_gateway_{}", rand::random::<u64>()))
    }

    #[tokio::test]
    async fn lists_and_fetches_files() {
        let dir = temp_dir();
        let gateway = FilesystemGateway::new(&dir).await.unwrap();
        std::fs::write(dir.join("invoice_1030.pdf"), b"%PDF-1.4").unwrap();
        std::fs::create_dir(dir.join("subdir")).unwrap();

        let objects = gateway.list_objects().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "invoice_1030.pdf");
        assert_eq!(objects[0].size, 8);

        let bytes = gateway.fetch_object("invoice_1030.pdf").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
        assert!(matches!(gateway.fetch_object("missing.pdf").await, Err(GatewayError::NotFound(_))));
        gateway.check_connectivity().await.unwrap();
    }
}
