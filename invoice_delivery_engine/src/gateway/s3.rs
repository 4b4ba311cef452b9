use async_trait::async_trait;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use gig_common::Secret;
use log::*;

use super::{GatewayError, ObjectStoreGateway};
use crate::types::ObjectMeta;

/// Connection settings for an S3-compatible object store. An explicit endpoint switches the client to
/// path-style addressing, which MinIO-class stores require.
#[derive(Clone, Debug, Default)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<Secret<String>>,
    pub secret_key: Option<Secret<String>>,
}

pub struct S3Gateway {
    client: Client,
    bucket: String,
}

impl S3Gateway {
    /// Builds the client from the given settings, falling back to ambient AWS configuration (environment
    /// credentials, IAM role) for anything not set explicitly. Building the client is local; reachability is only
    /// established by [`ObjectStoreGateway::check_connectivity`].
    pub async fn connect(config: ObjectStoreConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                access_key.reveal().clone(),
                secret_key.reveal().clone(),
                None,
                None,
                "gig-config",
            );
            loader = loader.credentials_provider(credentials);
        }
        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        debug!("📦 Object store client configured for bucket '{}'", config.bucket);
        Self { client, bucket: config.bucket }
    }
}

#[async_trait]
impl ObjectStoreGateway for S3Gateway {
    async fn list_objects(&self) -> Result<Vec<ObjectMeta>, GatewayError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| GatewayError::Transport(format!("Listing bucket '{}' failed: {e}", self.bucket)))?;
            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectMeta {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0),
                    last_modified: object.last_modified().and_then(to_chrono),
                    etag: object.e_tag().map(|s| s.to_string()),
                });
            }
            continuation_token = response.next_continuation_token().map(|s| s.to_string());
            if continuation_token.is_none() {
                break;
            }
        }
        trace!("📦 Listed {} objects in bucket '{}'", objects.len(), self.bucket);
        Ok(objects)
    }

    async fn fetch_object(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let response =
            self.client.get_object().bucket(&self.bucket).key(key).send().await.map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NoSuchKey") || msg.contains("404") {
                    GatewayError::NotFound(key.to_string())
                } else {
                    GatewayError::Transport(format!("Fetching '{key}' failed: {msg}"))
                }
            })?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| GatewayError::Transport(format!("Reading body of '{key}' failed: {e}")))?
            .into_bytes()
            .to_vec();
        debug!("📦 Fetched '{key}' ({} bytes) from bucket '{}'", bytes.len(), self.bucket);
        Ok(bytes)
    }

    async fn check_connectivity(&self) -> Result<(), GatewayError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::Transport(format!("Bucket '{}' is not reachable: {e}", self.bucket)))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}
