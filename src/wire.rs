//! Wire framing for the streaming transport.
//!
//! The HTTP layer is out of scope, but the frame shape and its SSE
//! encoding are a boundary contract: a broadcast push crosses the wire
//! as `data: <json>\n\n` where the JSON is
//! `{timestamp, type: "record_emission" | "record_history", data}`.
//! Consumers depend on this framing staying bit-compatible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TelemetryError, TelemetryResult};
use crate::record::StreamRecord;

/// Discriminator for the frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A single live emission.
    RecordEmission,
    /// A batch of historical records, oldest first.
    RecordHistory,
}

/// One frame of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// When the frame was produced.
    pub timestamp: DateTime<Utc>,
    /// What `data` holds.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Frame payload.
    pub data: Value,
}

impl StreamFrame {
    /// Frames a single live emission.
    pub fn emission(record: &StreamRecord) -> TelemetryResult<Self> {
        Ok(Self {
            timestamp: Utc::now(),
            kind: FrameKind::RecordEmission,
            data: serde_json::to_value(record)
                .map_err(|e| TelemetryError::internal(format!("frame encoding failed: {e}")))?,
        })
    }

    /// Frames a batch of historical records.
    pub fn history(records: &[StreamRecord]) -> TelemetryResult<Self> {
        Ok(Self {
            timestamp: Utc::now(),
            kind: FrameKind::RecordHistory,
            data: serde_json::to_value(records)
                .map_err(|e| TelemetryError::internal(format!("frame encoding failed: {e}")))?,
        })
    }

    /// Encodes the frame as a Server-Sent-Events message.
    pub fn to_sse(&self) -> TelemetryResult<String> {
        let json = serde_json::to_string(self)
            .map_err(|e| TelemetryError::internal(format!("frame encoding failed: {e}")))?;
        Ok(format!("data: {json}\n\n"))
    }
}
