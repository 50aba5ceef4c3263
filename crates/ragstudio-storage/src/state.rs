use aws_sdk_s3::Client;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::StorageError;
use crate::objects;

/// Load a JSON document from S3.
pub async fn load_state<T: DeserializeOwned>(
    client: &Client,
    bucket: &str,
    key: &str,
) -> Result<T, StorageError> {
    let body = objects::get_object(client, bucket, key).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Load a JSON document from S3, or `T::default()` if the key is absent.
pub async fn load_state_or_default<T: DeserializeOwned + Default>(
    client: &Client,
    bucket: &str,
    key: &str,
) -> Result<T, StorageError> {
    match load_state(client, bucket, key).await {
        Ok(value) => Ok(value),
        Err(StorageError::NotFound { .. }) => Ok(T::default()),
        Err(e) => Err(e),
    }
}

/// Save a JSON document to S3.
pub async fn save_state<T: Serialize>(
    client: &Client,
    bucket: &str,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let body = serde_json::to_vec_pretty(value)?;
    objects::put_object(client, bucket, key, body, Some("application/json")).await
}
