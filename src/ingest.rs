//! Delta message normalization
//!
//! Turns raw update messages of the shape `{"b": [[price, size], ...],
//! "a": [...]}` into per-side `(price, size)` tuples. Price and size cells
//! may be JSON numbers or numeric strings. Individual tuples that fail to
//! parse are dropped and logged; only a wholly unparsable message counts
//! toward the malformed-stream threshold.

use crate::data::DeltaBatch;
use crate::error::{MalformedDeltaError, StreamError};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Normalizes incoming delta messages and tracks stream health
#[derive(Debug)]
pub struct DeltaIngestor {
    malformed_threshold: u32,
    consecutive_malformed: u32,
}

impl DeltaIngestor {
    pub fn new(malformed_threshold: u32) -> Self {
        Self {
            malformed_threshold,
            consecutive_malformed: 0,
        }
    }

    /// Parse one raw message.
    ///
    /// A malformed message is dropped (an empty batch is returned) until
    /// the consecutive-failure threshold is crossed, at which point the
    /// stream itself is reported lost.
    pub fn ingest(&mut self, raw: &str) -> Result<DeltaBatch, StreamError> {
        match parse_message(raw) {
            Ok(batch) => {
                self.consecutive_malformed = 0;
                Ok(batch)
            }
            Err(err) => {
                self.consecutive_malformed += 1;
                tracing::warn!(
                    "Dropping malformed delta message ({} consecutive): {}",
                    self.consecutive_malformed,
                    err
                );

                if self.consecutive_malformed >= self.malformed_threshold {
                    Err(StreamError::MalformedThreshold {
                        count: self.consecutive_malformed,
                    })
                } else {
                    Ok(DeltaBatch::default())
                }
            }
        }
    }

    /// Reset stream health, e.g. after a resync.
    pub fn reset(&mut self) {
        self.consecutive_malformed = 0;
    }
}

/// Parse a `{"b": [...], "a": [...]}` delta message.
///
/// Either side may be absent; a message carrying neither is malformed.
pub fn parse_message(raw: &str) -> Result<DeltaBatch, MalformedDeltaError> {
    let json: Value =
        serde_json::from_str(raw).map_err(|e| MalformedDeltaError::InvalidJson(e.to_string()))?;

    let obj = match json.as_object() {
        Some(obj) => obj,
        None => return Err(MalformedDeltaError::MissingSides),
    };

    if !obj.contains_key("b") && !obj.contains_key("a") {
        return Err(MalformedDeltaError::MissingSides);
    }

    let bids = obj.get("b").map(|v| parse_side(v, "b")).unwrap_or_default();
    let asks = obj.get("a").map(|v| parse_side(v, "a")).unwrap_or_default();

    Ok(DeltaBatch { bids, asks })
}

/// Parse one side's rows, dropping malformed tuples.
fn parse_side(value: &Value, side: &str) -> Vec<(Decimal, Decimal)> {
    let rows = match value.as_array() {
        Some(rows) => rows,
        None => {
            tracing::warn!("Delta side '{}' is not an array, ignoring", side);
            return Vec::new();
        }
    };

    let mut parsed = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_level(row) {
            Ok(pair) => parsed.push(pair),
            Err(err) => {
                tracing::warn!("Dropping malformed delta tuple on side '{}': {}", side, err);
            }
        }
    }
    parsed
}

/// Parse one `[price, size]` tuple.
pub(crate) fn parse_level(row: &Value) -> Result<(Decimal, Decimal), MalformedDeltaError> {
    let cells = match row.as_array() {
        Some(cells) if cells.len() >= 2 => cells,
        _ => return Err(MalformedDeltaError::InvalidPrice(row.to_string())),
    };

    let price = parse_decimal(&cells[0]).map_err(MalformedDeltaError::InvalidPrice)?;
    let size = parse_decimal(&cells[1]).map_err(MalformedDeltaError::InvalidSize)?;

    if price.is_sign_negative() {
        return Err(MalformedDeltaError::InvalidPrice(price.to_string()));
    }
    if size.is_sign_negative() {
        return Err(MalformedDeltaError::InvalidSize(size.to_string()));
    }

    Ok((price, size))
}

/// Parse a numeric-or-string cell into a Decimal.
fn parse_decimal(value: &Value) -> Result<Decimal, String> {
    match value {
        Value::String(s) => Decimal::from_str(s).map_err(|e| format!("'{}': {}", s, e)),
        Value::Number(n) => Decimal::from_str(&n.to_string()).map_err(|e| format!("{}: {}", n, e)),
        other => Err(format!("not a number: {}", other)),
    }
}
