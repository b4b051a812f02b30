#![forbid(unsafe_code)]

use crate::primitives::bytes::{buf::Cursor, lp, ord};
use crate::storage::dictionary::LabelDict;
use crate::types::{LabelIdx, Result, Timestamp};

/// One direction of an edge as observed from a vertex's adjacency record.
///
/// Emitted extremely frequently, so the wire form is kept compact:
/// `[4-byte label length][label bytes][4-byte vertexId length][vertexId
/// bytes]`, with the timestamp carried by the enclosing record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeInfo {
    /// Edge label. Empty only for degenerate pre-migration records.
    pub label: String,
    /// Identifier of the vertex on the other end of the edge.
    pub other_vertex_id: String,
    /// Write timestamp of the enclosing record.
    pub timestamp: Timestamp,
}

impl EdgeInfo {
    /// Encodes the label and other-vertex id in the compact wire layout.
    pub fn encode(label: &str, other_vertex_id: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + label.len() + other_vertex_id.len());
        lp::put_str(&mut out, label);
        lp::put_str(&mut out, other_vertex_id);
        out
    }

    /// Decodes the compact wire layout.
    ///
    /// Tolerant by contract: a zero-length or truncated field decodes to an
    /// empty string instead of failing, so a wholly-zero 8-byte buffer
    /// yields an `EdgeInfo` with empty label and id. Such null-like records
    /// occur in partially-written and pre-migration data and are normal
    /// values, not errors.
    pub fn decode(bytes: &[u8], timestamp: Timestamp) -> EdgeInfo {
        let mut cur = Cursor::new(bytes);
        let label = take_str_lenient(&mut cur);
        let other_vertex_id = take_str_lenient(&mut cur);
        EdgeInfo {
            label,
            other_vertex_id,
            timestamp,
        }
    }

    /// Encodes the alternate compact form that stores the dictionary index
    /// of the label instead of its raw bytes.
    pub fn encode_interned(dict: &mut LabelDict, label: &str, other_vertex_id: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + other_vertex_id.len());
        ord::put_u32_be(&mut out, dict.intern(label).0);
        lp::put_str(&mut out, other_vertex_id);
        out
    }

    /// Decodes the dictionary-indexed form.
    ///
    /// Must be handed the same dictionary instance used while encoding; a
    /// foreign index fails with [`crate::types::VeilError::InvalidLabelIndex`]. Unlike
    /// [`EdgeInfo::decode`] this form is strict: it only ever decodes
    /// records this process encoded within the current scan.
    pub fn decode_interned(
        dict: &LabelDict,
        bytes: &[u8],
        timestamp: Timestamp,
    ) -> Result<EdgeInfo> {
        let mut cur = Cursor::new(bytes);
        let idx = cur.u32_be()?;
        let label = dict.resolve(LabelIdx(idx))?.to_owned();
        let other_vertex_id = lp::get_str(&mut cur)?;
        cur.expect_end()?;
        Ok(EdgeInfo {
            label,
            other_vertex_id,
            timestamp,
        })
    }
}

/// Lenient field read: zero-length, truncated, or non-UTF-8 degrades to
/// the empty string.
fn take_str_lenient(cur: &mut Cursor<'_>) -> String {
    let Ok(len) = cur.u32_be() else {
        return String::new();
    };
    let Ok(bytes) = cur.take(len as usize) else {
        return String::new();
    };
    String::from_utf8(bytes.to_vec()).unwrap_or_default()
}
