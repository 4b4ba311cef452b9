//! # Invoice store
//!
//! The durable, one-file-per-invoice ledger. Every processed invoice lives at
//! `<storage_dir>/invoice_<PN>.json` (a bare `<PN>.json` is accepted on read for records written by earlier
//! deployments). The record embeds the artifact bytes as base64, so this directory is both the dedup ledger and the
//! source for later retrieval over the socket.
//!
//! Writes go to a temporary sibling which is fsynced and then renamed into place, so a reader never observes a
//! half-written record under a rename-atomic filesystem. Readers still retry once after a short pause to tolerate
//! platforms where the rename window is observable.
//!
//! The in-memory dedup cache mirrors the set of PO numbers present on disk. It is seeded by a directory scan at
//! startup and updated on every successful write, and may briefly lag the disk but never lead it.
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use gig_common::helpers::{elide, iso8601};
use log::*;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};

use crate::types::{InvoiceRecord, PoNumber};

/// How long a reader waits before its single retry when a record looks absent or half-written.
const REREAD_DELAY: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error in the invoice store. {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not serialize the invoice record for {0}. {1}")]
    Serialization(PoNumber, String),
    #[error("The invoice record for {0} is not valid JSON. {1}")]
    Corrupt(PoNumber, String),
    #[error("No invoice record exists for {0}")]
    NotFound(PoNumber),
    #[error("{0} contains characters that cannot be used in a storage filename")]
    UnsafePoNumber(PoNumber),
}

#[derive(Clone)]
pub struct InvoiceStore {
    dir: PathBuf,
    cache: Arc<Mutex<HashSet<PoNumber>>>,
}

impl InvoiceStore {
    /// Opens (creating if necessary) the storage directory and seeds the dedup cache from the records already on
    /// disk. Failure here is fatal for the process: there is no invoice delivery without a ledger.
    pub async fn new<P: Into<PathBuf>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let known = scan_directory(&dir).await?;
        info!("🗃️ Invoice store opened at {} with {} existing records", dir.display(), known.len());
        Ok(Self { dir, cache: Arc::new(Mutex::new(known.into_iter().collect())) })
    }

    /// O(1) dedup check against the in-memory cache.
    pub fn has(&self, po_number: &PoNumber) -> bool {
        match self.cache.lock() {
            Ok(cache) => cache.contains(po_number),
            Err(e) => {
                error!("🗃️ Error getting lock on the dedup cache: {e}");
                false
            },
        }
    }

    /// Persists a record and marks its PO number as processed. The input record's `savedAt` and `filePath` fields
    /// are stamped here; everything else is written exactly as given. Returns the record as stored.
    pub async fn put(&self, record: &InvoiceRecord) -> Result<InvoiceRecord, StorageError> {
        let po_number = record.invoice_number.clone();
        let path = self.canonical_path(&po_number)?;
        let mut stored = record.clone();
        stored.saved_at = Some(iso8601(Utc::now()));
        stored.file_path = Some(path.display().to_string());
        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| StorageError::Serialization(po_number.clone(), e.to_string()))?;

        // Write-temp-then-rename. A direct write over the target is never acceptable: a concurrent reader could
        // observe partial content.
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(po_number.clone());
        }
        debug!("🗃️ Stored invoice record for {po_number} ({} bytes) at {}", json.len(), path.display());
        trace!("🗃️ {po_number} payload: {}", elide(&stored.base64_data, 40));
        Ok(stored)
    }

    /// Reads a record back, trying the canonical filename first and the legacy one second. A miss or a
    /// half-written file is retried once after a short pause before giving up.
    pub async fn get(&self, po_number: &PoNumber) -> Result<InvoiceRecord, StorageError> {
        match self.read_record(po_number).await? {
            Some(record) => Ok(record),
            None => {
                tokio::time::sleep(REREAD_DELAY).await;
                self.read_record(po_number).await?.ok_or_else(|| StorageError::NotFound(po_number.clone()))
            },
        }
    }

    /// PO numbers of every record on disk. Only used to seed the dedup cache at startup and by administrative
    /// tooling; the hot path goes through [`InvoiceStore::has`].
    pub async fn list(&self) -> Result<Vec<PoNumber>, StorageError> {
        scan_directory(&self.dir).await
    }

    /// Administrative removal of a record. The dedup cache entry goes with it.
    pub async fn delete(&self, po_number: &PoNumber) -> Result<(), StorageError> {
        let canonical = self.canonical_path(po_number)?;
        let legacy = self.legacy_path(po_number)?;
        let mut removed = false;
        for path in [canonical, legacy] {
            match fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(e.into()),
            }
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(po_number);
        }
        if removed {
            info!("🗃️ Deleted invoice record for {po_number}");
            Ok(())
        } else {
            Err(StorageError::NotFound(po_number.clone()))
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.dir
    }

    async fn read_record(&self, po_number: &PoNumber) -> Result<Option<InvoiceRecord>, StorageError> {
        for path in [self.canonical_path(po_number)?, self.legacy_path(po_number)?] {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<InvoiceRecord>(&bytes) {
                Ok(mut record) => {
                    if record.invoice_number.as_str().is_empty() {
                        record.invoice_number = po_number.clone();
                    }
                    return Ok(Some(record));
                },
                Err(e) => {
                    // Probably caught mid-rename on a platform without atomic rename. The caller retries once;
                    // a second failure means the record really is corrupt.
                    warn!("🗃️ Record at {} did not parse ({e}). Treating as a write window", path.display());
                    return Ok(None);
                },
            }
        }
        Ok(None)
    }

    fn canonical_path(&self, po_number: &PoNumber) -> Result<PathBuf, StorageError> {
        validate_po_number(po_number)?;
        Ok(self.dir.join(format!("invoice_{}.json", po_number.as_str())))
    }

    fn legacy_path(&self, po_number: &PoNumber) -> Result<PathBuf, StorageError> {
        validate_po_number(po_number)?;
        Ok(self.dir.join(format!("{}.json", po_number.as_str())))
    }
}

/// PO numbers are opaque strings from an external service, but they become filenames here. Anything that could
/// escape the storage directory or confuse the filename round-trip is rejected before it touches the filesystem.
fn validate_po_number(po_number: &PoNumber) -> Result<(), StorageError> {
    let s = po_number.as_str();
    let safe = !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if safe && s != "." && s != ".." {
        Ok(())
    } else {
        Err(StorageError::UnsafePoNumber(po_number.clone()))
    }
}

async fn scan_directory(dir: &Path) -> Result<Vec<PoNumber>, StorageError> {
    let mut numbers = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(".json") else { continue };
        let po = stem.strip_prefix("invoice_").unwrap_or(stem);
        if !po.is_empty() {
            numbers.push(po.into());
        }
    }
    Ok(numbers)
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::types::S3Metadata;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gig_invoice_store_{}", rand::random::<u64>()))
    }

    fn record(po: &str, payload: &[u8]) -> InvoiceRecord {
        use base64::{engine::general_purpose::STANDARD as b64, Engine};
        InvoiceRecord {
            invoice_number: po.into(),
            player_id: Some("alice".into()),
            base64_data: b64.encode(payload),
            filename: format!("invoice_{po}.pdf"),
            file_size: payload.len() as u64,
            processed_at: Utc::now(),
            s3_metadata: S3Metadata {
                s3_key: format!("invoice_{po}.pdf"),
                s3_size: payload.len() as i64,
                s3_last_modified: None,
            },
            summary: Some(serde_json::json!({ "total": 50 })),
            saved_at: None,
            file_path: None,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InvoiceStore::new(temp_dir()).await.unwrap();
        let original = record("1030", b"%PDF-1.4\nhello");
        let stored = store.put(&original).await.unwrap();
        assert!(stored.saved_at.is_some());
        assert!(stored.file_path.as_deref().unwrap().ends_with("invoice_1030.json"));

        let read_back = store.get(&"1030".into()).await.unwrap();
        assert_eq!(read_back.base64_data, original.base64_data);
        assert_eq!(read_back.file_size, original.file_size);
        assert_eq!(read_back.player_id, original.player_id);
        assert_eq!(read_back.summary, original.summary);
        assert!(store.has(&"1030".into()));
    }

    #[tokio::test]
    async fn no_temp_file_is_left_behind() {
        let dir = temp_dir();
        let store = InvoiceStore::new(&dir).await.unwrap();
        store.put(&record("1030", b"bytes")).await.unwrap();
        assert!(!dir.join("invoice_1030.json.tmp").exists());
        assert!(dir.join("invoice_1030.json").exists());
    }

    #[tokio::test]
    async fn legacy_filenames_are_accepted_on_read() {
        let dir = temp_dir();
        let store = InvoiceStore::new(&dir).await.unwrap();
        let json = serde_json::to_vec(&record("777", b"legacy")).unwrap();
        std::fs::write(dir.join("777.json"), json).unwrap();

        let read_back = store.get(&"777".into()).await.unwrap();
        assert_eq!(read_back.invoice_number.as_str(), "777");
    }

    #[tokio::test]
    async fn startup_scan_seeds_the_cache() {
        let dir = temp_dir();
        {
            let store = InvoiceStore::new(&dir).await.unwrap();
            store.put(&record("1030", b"a")).await.unwrap();
            store.put(&record("2001", b"b")).await.unwrap();
        }
        let reopened = InvoiceStore::new(&dir).await.unwrap();
        assert!(reopened.has(&"1030".into()));
        assert!(reopened.has(&"2001".into()));
        assert!(!reopened.has(&"9999".into()));
        let mut listed = reopened.list().await.unwrap();
        listed.sort();
        assert_eq!(listed, vec![PoNumber::from("1030"), PoNumber::from("2001")]);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = InvoiceStore::new(temp_dir()).await.unwrap();
        assert!(matches!(store.get(&"42".into()).await, Err(StorageError::NotFound(_))));
        assert!(!store.has(&"42".into()));
    }

    #[tokio::test]
    async fn delete_removes_record_and_cache_entry() {
        let store = InvoiceStore::new(temp_dir()).await.unwrap();
        store.put(&record("1030", b"x")).await.unwrap();
        store.delete(&"1030".into()).await.unwrap();
        assert!(!store.has(&"1030".into()));
        assert!(matches!(store.get(&"1030".into()).await, Err(StorageError::NotFound(_))));
        assert!(matches!(store.delete(&"1030".into()).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn path_escaping_po_numbers_are_rejected() {
        let store = InvoiceStore::new(temp_dir()).await.unwrap();
        let mut bad = record("1030", b"x");
        bad.invoice_number = "../../etc/passwd".into();
        assert!(matches!(store.put(&bad).await, Err(StorageError::UnsafePoNumber(_))));
        assert!(matches!(store.get(&"a/b".into()).await, Err(StorageError::UnsafePoNumber(_))));
    }
}
