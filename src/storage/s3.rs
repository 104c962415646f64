//! AWS S3 primary document store.
//!
//! Each flush becomes one JSON-lines object; a small counter object per
//! collection keeps `count` cheap.
//!
//! ```text
//! s3://{bucket}/{prefix}/{database}/{collection}/
//! ├── _count.json                       # {"count": 1234}
//! └── 2018-10-14/
//!     └── 130509123456789-1006.jsonl    # {time}-{first id}
//! ```

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::EnrichedRecord;
use crate::storage::{Collection, DocumentStore};

const COUNT_KEY: &str = "_count.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionCount {
    count: u64,
}

/// S3-backed document store.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create S3 storage using the default AWS credential chain.
    pub async fn from_env(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket, prefix)
    }

    fn database_prefix(&self, database: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{database}/")
        } else {
            format!("{prefix}/{database}/")
        }
    }

    fn collection_prefix(&self, collection: &Collection) -> String {
        format!(
            "{}{}/",
            self.database_prefix(&collection.database),
            collection.collection
        )
    }

    async fn read_bytes_optional(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(e.to_string()))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| AppError::S3(e.to_string()))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string())
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn read_count(&self, collection: &Collection) -> Result<u64> {
        let key = format!("{}{}", self.collection_prefix(collection), COUNT_KEY);
        match self.read_bytes_optional(&key).await? {
            Some(bytes) => Ok(serde_json::from_slice::<CollectionCount>(&bytes)?.count),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl DocumentStore for S3Storage {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix.trim_matches('/'))
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;
        Ok(())
    }

    async fn insert_many(
        &self,
        collection: &Collection,
        records: &[EnrichedRecord],
    ) -> Result<()> {
        let now = Utc::now();
        let first_id = records
            .first()
            .and_then(EnrichedRecord::id)
            .map_or_else(|| "0".to_string(), |id| id.to_string());
        let key = format!(
            "{}{}/{}-{}.jsonl",
            self.collection_prefix(collection),
            now.format("%Y-%m-%d"),
            now.format("%H%M%S%f"),
            first_id
        );

        let mut body = Vec::new();
        for record in records {
            serde_json::to_writer(&mut body, record)?;
            body.push(b'\n');
        }
        self.put(&key, body, "application/x-ndjson").await?;

        let count = CollectionCount {
            count: self.read_count(collection).await? + records.len() as u64,
        };
        let count_key = format!("{}{}", self.collection_prefix(collection), COUNT_KEY);
        self.put(&count_key, serde_json::to_vec(&count)?, "application/json")
            .await?;

        log::info!(
            "Wrote {} records to s3://{}/{}",
            records.len(),
            self.bucket,
            key
        );
        Ok(())
    }

    async fn count(&self, collection: &Collection) -> Result<u64> {
        self.read_count(collection).await
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        let keys = self.list_keys(&self.database_prefix(database)).await?;
        for key in &keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| AppError::S3(e.to_string()))?;
        }
        log::info!("Deleted {} objects from s3://{}", keys.len(), self.bucket);
        Ok(())
    }
}
