//! Snapshot wire format.
//!
//! A snapshot is one object-store file:
//!
//! ```text
//! [u16 BE: header length][JSON header]
//! repeated: [u16 BE: entry length][JSON entry]
//! [u8: 0]
//! ```
//!
//! The header records the log id, its heads, the entry count and the store
//! type; entries follow in log-traversal order.

use serde::{Deserialize, Serialize};

use eddy_log::Entry;

use crate::error::StoreError;

/// JSON header at the front of a snapshot stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Log identifier.
    pub id: String,
    /// Heads at snapshot time.
    pub heads: Vec<Entry>,
    /// Number of entries that follow the header.
    pub size: usize,
    /// Store type tag.
    #[serde(rename = "type")]
    pub store_type: String,
}

/// Serialize a snapshot stream.
pub fn encode_snapshot(header: &SnapshotHeader, entries: &[Entry]) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();

    let header_json = serde_json::to_vec(header)?;
    out.extend_from_slice(&(header_json.len() as u16).to_be_bytes());
    out.extend_from_slice(&header_json);

    for entry in entries {
        let entry_json = serde_json::to_vec(entry)?;
        out.extend_from_slice(&(entry_json.len() as u16).to_be_bytes());
        out.extend_from_slice(&entry_json);
    }

    out.push(0);
    Ok(out)
}

/// Parse a snapshot stream back into its header and entries.
pub fn decode_snapshot(bytes: &[u8]) -> Result<(SnapshotHeader, Vec<Entry>), StoreError> {
    let mut cursor = Cursor { bytes, pos: 0 };

    let header_raw = cursor.frame()?;
    let header: SnapshotHeader = serde_json::from_slice(header_raw)?;

    let mut entries = Vec::with_capacity(header.size);
    for _ in 0..header.size {
        let entry_raw = cursor.frame()?;
        entries.push(serde_json::from_slice(entry_raw)?);
    }

    match cursor.byte() {
        Ok(0) => Ok((header, entries)),
        Ok(b) => Err(StoreError::SnapshotCorrupt(format!(
            "expected terminator, found {b:#04x}"
        ))),
        Err(e) => Err(e),
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self) -> Result<u8, StoreError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| StoreError::SnapshotCorrupt("unexpected end of stream".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn frame(&mut self) -> Result<&'a [u8], StoreError> {
        let hi = self.byte()?;
        let lo = self.byte()?;
        let len = u16::from_be_bytes([hi, lo]) as usize;

        let end = self.pos + len;
        let frame = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| StoreError::SnapshotCorrupt("truncated frame".into()))?;
        self.pos = end;
        Ok(frame)
    }
}
