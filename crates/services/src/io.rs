//! Helpers shared by every call into the backend ports.

use domains::{BoardError, Record, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Runs a backend call under a deadline. Expiry surfaces as
/// [`BoardError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BoardError::Timeout(limit)),
    }
}

pub(crate) fn decode_row<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(record)?)
}

pub(crate) fn decode_rows<T: DeserializeOwned>(records: Vec<Record>) -> Result<Vec<T>> {
    records.into_iter().map(decode_row).collect()
}

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<Record> {
    Ok(serde_json::to_value(value)?)
}
