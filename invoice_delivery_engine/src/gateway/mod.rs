//! # Object store gateway
//!
//! A thin adapter over an S3-compatible object store. The polling engine only ever needs two operations (list the
//! bucket, fetch an object's bytes) plus a startup reachability probe, so that is the whole seam. Iteration order
//! of a listing is unspecified and may change between calls. The gateway does no caching.
mod filesystem;
mod memory;
mod s3;

use async_trait::async_trait;
pub use filesystem::FilesystemGateway;
pub use memory::MemoryGateway;
pub use s3::{ObjectStoreConfig, S3Gateway};
use thiserror::Error;

use crate::types::ObjectMeta;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Object not found in the bucket: {0}")]
    NotFound(String),
    #[error("Object store transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Full listing of the bucket. Finite; order unspecified.
    async fn list_objects(&self) -> Result<Vec<ObjectMeta>, GatewayError>;

    /// The complete bytes of one object.
    async fn fetch_object(&self, key: &str) -> Result<Vec<u8>, GatewayError>;

    /// Startup reachability probe. Whether a failure here is fatal is the caller's decision.
    async fn check_connectivity(&self) -> Result<(), GatewayError>;

    fn bucket(&self) -> &str;
}
