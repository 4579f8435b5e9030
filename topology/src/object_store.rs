//! Read access to the exported gateway configuration. Keys are flat,
//! `/`-separated paths; listing a prefix returns every key below it.
use crate::counter;
use crate::metrics_defs::{OBJECT_FETCH_FAILED, OBJECTS_FETCHED};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use serde_json::Value;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("object {key} is not valid JSON: {source}")]
    Json {
        key: String,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every object whose key starts with `prefix`, in store order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, FetchError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError>;

    async fn fetch_json(&self, key: &str) -> Result<Value, FetchError> {
        let result = self.get(key).await.and_then(|bytes| {
            serde_json::from_slice(&bytes).map_err(|source| FetchError::Json {
                key: key.to_string(),
                source,
            })
        });

        match &result {
            Ok(_) => counter!(OBJECTS_FETCHED).increment(1),
            Err(_) => counter!(OBJECT_FETCH_FAILED).increment(1),
        }

        result
    }
}

/// Serves an export that was synced to a local directory.
pub struct FilesystemObjectStore {
    base_dir: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(base_dir: &str) -> Self {
        FilesystemObjectStore {
            base_dir: PathBuf::from(base_dir),
        }
    }

    fn key_for(&self, path: &Path) -> io::Result<String> {
        let relative = path.strip_prefix(&self.base_dir).map_err(io::Error::other)?;
        Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, FetchError> {
        // Only the directory part of the prefix narrows the walk; the rest is
        // matched against the key.
        let dir = match prefix.rfind('/') {
            Some(idx) => self.base_dir.join(&prefix[..idx]),
            None => self.base_dir.clone(),
        };
        let mut entries = Vec::new();
        let mut dirs_to_visit = vec![dir];

        while let Some(dir) = dirs_to_visit.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = read_dir.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();

                if file_type.is_dir() {
                    dirs_to_visit.push(path);
                } else if file_type.is_file() {
                    entries.push(ObjectEntry {
                        key: self.key_for(&path)?,
                        size: entry.metadata().await?.len(),
                    });
                }
            }
        }
        entries.retain(|e| e.key.starts_with(prefix));
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        match fs::read(self.base_dir.join(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client from the default AWS credential and region chain.
    pub async fn new(bucket: &str) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        Self::from_client(Client::new(&sdk_config), bucket)
    }

    pub fn from_client(client: Client, bucket: &str) -> Self {
        S3ObjectStore {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, FetchError> {
        let mut entries = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| map_s3_error(e, prefix))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    entries.push(ObjectEntry {
                        key: key.to_string(),
                        size: object.size().unwrap_or_default().max(0) as u64,
                    });
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(entries)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| FetchError::S3(format!("failed to read body of {key}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }
}

fn map_s3_error<E: Debug>(err: SdkError<E>, key: &str) -> FetchError {
    match &err {
        SdkError::ServiceError(service_err) => match service_err.raw().status().as_u16() {
            404 => FetchError::NotFound(key.to_string()),
            status => FetchError::S3(format!("{key} (HTTP {status}): {err:?}")),
        },
        _ => FetchError::S3(format!("{key}: {err:?}")),
    }
}
