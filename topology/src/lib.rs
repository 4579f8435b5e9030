//! Synchronizes an exported API gateway configuration (deployments,
//! environments, virtual hosts, proxies, target servers) into an external
//! topology service as nodes and typed edges.

use std::sync::Arc;

pub mod assembler;
pub mod client;
pub mod config;
pub mod metrics_defs;
pub mod normalize;
pub mod object_store;
pub mod payload;
pub mod publisher;
pub mod sync;
pub mod types;

#[cfg(test)]
mod testutils;

use config::ObjectStoreType;
use object_store::{FetchError, FilesystemObjectStore, ObjectStore, S3ObjectStore};

pub async fn get_store(
    store_type: &ObjectStoreType,
) -> Result<Arc<dyn ObjectStore + 'static>, FetchError> {
    match store_type {
        ObjectStoreType::Filesystem { base_dir } => {
            match tokio::fs::metadata(base_dir).await {
                Ok(metadata) if metadata.is_dir() => {}
                Ok(_) => return Err(FetchError::NotFound(base_dir.clone())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(FetchError::NotFound(base_dir.clone()));
                }
                Err(e) => return Err(e.into()),
            }
            Ok(Arc::new(FilesystemObjectStore::new(base_dir)))
        }
        ObjectStoreType::S3 { bucket } => Ok(Arc::new(S3ObjectStore::new(bucket).await)),
    }
}
