//! Snapshot loading
//!
//! Fetches a full two-sided book capture. The engine only sees the
//! `SnapshotSource` trait; the bundled HTTP loader fetches a JSON
//! `{bids, asks}` payload. Unlike delta ingestion, snapshot parsing is
//! strict: one bad level fails the whole fetch, because a partial snapshot
//! cannot seed a consistent book.

use crate::data::RawSnapshot;
use crate::error::SnapshotFetchError;
use crate::ingest;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use url::Url;

/// Source of full book snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<RawSnapshot, SnapshotFetchError>;
}

/// HTTP snapshot loader
///
/// GETs an endpoint returning `{ "bids": [[price, size], ...],
/// "asks": [...] }` with numeric or numeric-string cells. Retry policy is
/// the caller's concern.
#[derive(Debug, Clone)]
pub struct HttpSnapshotLoader {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSnapshotLoader {
    pub fn new(endpoint: &str) -> Result<Self, SnapshotFetchError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SnapshotFetchError::Malformed(format!("invalid endpoint: {}", e)))?;

        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(SnapshotFetchError::Malformed(format!(
                "endpoint must be http(s): {}",
                endpoint
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    /// Reuse an existing client (connection pooling across loaders).
    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotLoader {
    async fn fetch(&self) -> Result<RawSnapshot, SnapshotFetchError> {
        let response = self.client.get(self.endpoint.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotFetchError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SnapshotFetchError::Malformed(e.to_string()))?;

        parse_snapshot_value(&body)
    }
}

/// Parse a `{bids, asks}` payload.
pub fn parse_snapshot_value(value: &Value) -> Result<RawSnapshot, SnapshotFetchError> {
    let obj = value
        .as_object()
        .ok_or_else(|| SnapshotFetchError::Malformed("payload is not an object".to_string()))?;

    let bids = parse_snapshot_side(obj.get("bids"), "bids")?;
    let asks = parse_snapshot_side(obj.get("asks"), "asks")?;

    Ok(RawSnapshot { bids, asks })
}

fn parse_snapshot_side(
    value: Option<&Value>,
    name: &str,
) -> Result<Vec<(Decimal, Decimal)>, SnapshotFetchError> {
    let rows = value.and_then(|v| v.as_array()).ok_or_else(|| {
        SnapshotFetchError::Malformed(format!("missing or invalid '{}' array", name))
    })?;

    let mut parsed = Vec::with_capacity(rows.len());
    for row in rows {
        let level = ingest::parse_level(row)
            .map_err(|e| SnapshotFetchError::Malformed(format!("bad '{}' level: {}", name, e)))?;
        parsed.push(level);
    }

    Ok(parsed)
}
