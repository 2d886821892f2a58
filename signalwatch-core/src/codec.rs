//! Snapshot wire formats and stream framing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use signalwatch_types::Snapshot;

use crate::error::CodecError;

/// An encoded snapshot, shared by every subscriber of one publish.
pub type Payload = Arc<[u8]>;

/// Serialization used on the subscriber feed.
///
/// JSON is newline-delimited on a byte stream; CBOR frames carry a
/// four-byte big-endian length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Cbor,
}

impl WireFormat {
    /// Encode a snapshot once, ready to hand to any number of subscribers.
    pub fn encode(&self, snapshot: &Snapshot) -> Result<Payload, CodecError> {
        let bytes = match self {
            WireFormat::Json => serde_json::to_vec(snapshot)?,
            WireFormat::Cbor => {
                minicbor::to_vec(snapshot).map_err(|e| CodecError::Cbor(e.to_string()))?
            }
        };
        Ok(bytes.into())
    }

    /// Decode a payload produced by [`encode`](Self::encode).
    pub fn decode(&self, bytes: &[u8]) -> Result<Snapshot, CodecError> {
        match self {
            WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
            WireFormat::Cbor => {
                minicbor::decode(bytes).map_err(|e| CodecError::Cbor(e.to_string()))
            }
        }
    }

    /// Wrap a payload for a byte stream.
    pub fn frame(&self, payload: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(payload.len() + 4);
        match self {
            WireFormat::Json => {
                framed.extend_from_slice(payload);
                framed.push(b'\n');
            }
            WireFormat::Cbor => {
                let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
                framed.extend_from_slice(&len.to_be_bytes());
                framed.extend_from_slice(payload);
            }
        }
        framed
    }

    /// Split one length-prefixed CBOR frame off the front of `buf`.
    ///
    /// Returns the payload and the number of bytes consumed.
    pub fn unframe_cbor(buf: &[u8]) -> Result<(&[u8], usize), CodecError> {
        if buf.len() < 4 {
            return Err(CodecError::Truncated {
                expected: 4,
                actual: buf.len(),
            });
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let end = 4 + len;
        if buf.len() < end {
            return Err(CodecError::Truncated {
                expected: end,
                actual: buf.len(),
            });
        }
        Ok((&buf[4..end], end))
    }

    pub fn name(&self) -> &'static str {
        match self {
            WireFormat::Json => "json",
            WireFormat::Cbor => "cbor",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "cbor" => Ok(WireFormat::Cbor),
            other => Err(format!("unknown wire format: {}", other)),
        }
    }
}
