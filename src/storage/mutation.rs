#![forbid(unsafe_code)]

use crate::primitives::bytes::{buf::Cursor, lp};
use crate::types::{ElementId, ElementType, Result, Timestamp, VeilError};

/// Append-only registry of mutation discriminants.
///
/// A discriminant is a single unsigned byte written immediately before the
/// type-specific payload. Values are never reused or reassigned; adding a
/// variant means appending a new value here plus one encoder and one
/// decoder arm.
pub mod disc {
    /// Vertex signal: the element exists with a visibility.
    pub const ADD_VERTEX: u8 = 0x01;
    /// Edge signal: label, endpoint ids, and visibility.
    pub const ADD_EDGE: u8 = 0x02;
    /// Adjacency record seen from one endpoint vertex.
    pub const ADD_EDGE_REF: u8 = 0x03;
    /// Tombstone for a matching adjacency record.
    pub const SOFT_DELETE_EDGE_REF: u8 = 0x04;
    /// Property value write.
    pub const SET_PROPERTY: u8 = 0x05;
    /// Tombstone for a matching property value.
    pub const SOFT_DELETE_PROPERTY: u8 = 0x06;
    /// Tombstone for the whole element.
    pub const SOFT_DELETE_ELEMENT: u8 = 0x07;
    /// Reversible element-level visibility suppression.
    pub const MARK_ELEMENT_HIDDEN: u8 = 0x08;
    /// Cancels a matching element-level hide.
    pub const MARK_ELEMENT_VISIBLE: u8 = 0x09;
    /// Reversible property-level visibility suppression.
    pub const MARK_PROPERTY_HIDDEN: u8 = 0x0A;
    /// Cancels a matching property-level hide.
    pub const MARK_PROPERTY_VISIBLE: u8 = 0x0B;
    /// Property metadata write.
    pub const SET_METADATA: u8 = 0x0C;
}

/// Facets of an element a resolution may be restricted to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Facet {
    /// Element existence, visibility, hides, and adjacency.
    Element,
    /// Property values, tombstones, and hides.
    Property,
    /// Property metadata entries.
    PropertyMetadata,
}

/// One decoded mutation to a graph element.
///
/// Property-scoped variants carry key, name, and visibility as raw byte
/// sequences rather than strings: the resolution loop only ever compares
/// them byte-wise, and skipping the UTF-8 round-trip keeps the hot path
/// allocation-light.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    /// Vertex signal: the element exists with this visibility.
    AddVertex {
        /// Visibility of the vertex itself.
        visibility: Vec<u8>,
    },
    /// Edge signal carrying endpoint info.
    AddEdge {
        /// Edge label bytes.
        label: Vec<u8>,
        /// Identifier of the out-endpoint vertex.
        out_vertex_id: Vec<u8>,
        /// Identifier of the in-endpoint vertex.
        in_vertex_id: Vec<u8>,
        /// Visibility of the edge itself.
        visibility: Vec<u8>,
    },
    /// Adjacency record: this element gained an edge to another vertex.
    AddEdgeRef {
        /// Edge label bytes.
        label: Vec<u8>,
        /// Identifier of the vertex on the other end.
        other_vertex_id: Vec<u8>,
        /// Visibility of the referenced edge.
        visibility: Vec<u8>,
    },
    /// Tombstone suppressing the matching adjacency record.
    SoftDeleteEdgeRef {
        /// Edge label bytes.
        label: Vec<u8>,
        /// Identifier of the vertex on the other end.
        other_vertex_id: Vec<u8>,
        /// Visibility of the tombstone.
        visibility: Vec<u8>,
    },
    /// Property value write.
    SetProperty {
        /// Property key bytes.
        key: Vec<u8>,
        /// Property name bytes.
        name: Vec<u8>,
        /// Visibility of this value.
        visibility: Vec<u8>,
        /// Opaque value bytes.
        value: Vec<u8>,
    },
    /// Tombstone matched against live values by exact (key, name,
    /// visibility).
    SoftDeleteProperty {
        /// Property key bytes.
        key: Vec<u8>,
        /// Property name bytes.
        name: Vec<u8>,
        /// Visibility of the suppressed value.
        visibility: Vec<u8>,
    },
    /// Tombstone suppressing the whole element at and before its
    /// timestamp.
    SoftDeleteElement {
        /// Visibility of the tombstone.
        visibility: Vec<u8>,
    },
    /// Hides the element from callers satisfying the hidden-visibility.
    MarkElementHidden {
        /// Visibility expression governing who the element is hidden
        /// from.
        hidden_visibility: Vec<u8>,
    },
    /// Cancels the element-level hide carrying the same hidden-visibility.
    MarkElementVisible {
        /// The hidden-visibility token being cancelled.
        hidden_visibility: Vec<u8>,
        /// Opaque blob describing the originating hide, for audit.
        payload: Vec<u8>,
    },
    /// Hides one property slot from callers satisfying the
    /// hidden-visibility.
    MarkPropertyHidden {
        /// Property key bytes.
        key: Vec<u8>,
        /// Property name bytes.
        name: Vec<u8>,
        /// Visibility of the governed property value.
        visibility: Vec<u8>,
        /// Visibility expression governing who the value is hidden from.
        hidden_visibility: Vec<u8>,
    },
    /// Cancels the property-level hide carrying the same
    /// hidden-visibility, recording why the value became visible again.
    MarkPropertyVisible {
        /// Property key bytes.
        key: Vec<u8>,
        /// Property name bytes.
        name: Vec<u8>,
        /// Visibility of the governed property value.
        visibility: Vec<u8>,
        /// The prior hidden-visibility token being cancelled.
        hidden_visibility: Vec<u8>,
        /// Opaque blob describing the originating hide, for audit.
        payload: Vec<u8>,
    },
    /// Metadata write attached to a property slot.
    SetMetadata {
        /// Property key bytes.
        key: Vec<u8>,
        /// Property name bytes.
        name: Vec<u8>,
        /// Metadata entry name bytes.
        metadata_name: Vec<u8>,
        /// Visibility of the governed property value.
        visibility: Vec<u8>,
        /// Opaque metadata value bytes.
        value: Vec<u8>,
    },
}

impl Mutation {
    /// The registry byte for this variant.
    pub fn discriminant(&self) -> u8 {
        match self {
            Mutation::AddVertex { .. } => disc::ADD_VERTEX,
            Mutation::AddEdge { .. } => disc::ADD_EDGE,
            Mutation::AddEdgeRef { .. } => disc::ADD_EDGE_REF,
            Mutation::SoftDeleteEdgeRef { .. } => disc::SOFT_DELETE_EDGE_REF,
            Mutation::SetProperty { .. } => disc::SET_PROPERTY,
            Mutation::SoftDeleteProperty { .. } => disc::SOFT_DELETE_PROPERTY,
            Mutation::SoftDeleteElement { .. } => disc::SOFT_DELETE_ELEMENT,
            Mutation::MarkElementHidden { .. } => disc::MARK_ELEMENT_HIDDEN,
            Mutation::MarkElementVisible { .. } => disc::MARK_ELEMENT_VISIBLE,
            Mutation::MarkPropertyHidden { .. } => disc::MARK_PROPERTY_HIDDEN,
            Mutation::MarkPropertyVisible { .. } => disc::MARK_PROPERTY_VISIBLE,
            Mutation::SetMetadata { .. } => disc::SET_METADATA,
        }
    }

    /// Which facet this variant belongs to.
    pub fn facet(&self) -> Facet {
        facet_of(self.discriminant()).expect("registered discriminant has a facet")
    }

    /// Writes the discriminant byte followed by the type-specific payload.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.discriminant());
        match self {
            Mutation::AddVertex { visibility } => {
                lp::put_bytes(out, visibility);
            }
            Mutation::AddEdge {
                label,
                out_vertex_id,
                in_vertex_id,
                visibility,
            } => {
                lp::put_bytes(out, label);
                lp::put_bytes(out, out_vertex_id);
                lp::put_bytes(out, in_vertex_id);
                lp::put_bytes(out, visibility);
            }
            Mutation::AddEdgeRef {
                label,
                other_vertex_id,
                visibility,
            }
            | Mutation::SoftDeleteEdgeRef {
                label,
                other_vertex_id,
                visibility,
            } => {
                lp::put_bytes(out, label);
                lp::put_bytes(out, other_vertex_id);
                lp::put_bytes(out, visibility);
            }
            Mutation::SetProperty {
                key,
                name,
                visibility,
                value,
            } => {
                lp::put_bytes(out, key);
                lp::put_bytes(out, name);
                lp::put_bytes(out, visibility);
                lp::put_bytes(out, value);
            }
            Mutation::SoftDeleteProperty {
                key,
                name,
                visibility,
            } => {
                lp::put_bytes(out, key);
                lp::put_bytes(out, name);
                lp::put_bytes(out, visibility);
            }
            Mutation::SoftDeleteElement { visibility } => {
                lp::put_bytes(out, visibility);
            }
            Mutation::MarkElementHidden { hidden_visibility } => {
                lp::put_bytes(out, hidden_visibility);
            }
            Mutation::MarkElementVisible {
                hidden_visibility,
                payload,
            } => {
                lp::put_bytes(out, hidden_visibility);
                lp::put_bytes(out, payload);
            }
            Mutation::MarkPropertyHidden {
                key,
                name,
                visibility,
                hidden_visibility,
            } => {
                lp::put_bytes(out, key);
                lp::put_bytes(out, name);
                lp::put_bytes(out, visibility);
                lp::put_bytes(out, hidden_visibility);
            }
            Mutation::MarkPropertyVisible {
                key,
                name,
                visibility,
                hidden_visibility,
                payload,
            } => {
                lp::put_bytes(out, key);
                lp::put_bytes(out, name);
                lp::put_bytes(out, visibility);
                lp::put_bytes(out, hidden_visibility);
                lp::put_bytes(out, payload);
            }
            Mutation::SetMetadata {
                key,
                name,
                metadata_name,
                visibility,
                value,
            } => {
                lp::put_bytes(out, key);
                lp::put_bytes(out, name);
                lp::put_bytes(out, metadata_name);
                lp::put_bytes(out, visibility);
                lp::put_bytes(out, value);
            }
        }
    }

    /// Convenience encoder returning a fresh payload buffer.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Reads the discriminant byte and dispatches to the matching decoder.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Mutation> {
        let discriminant = cur.u8()?;
        Self::decode_body(discriminant, cur)
    }

    /// Decodes the type-specific payload for an already-read discriminant.
    pub(crate) fn decode_body(discriminant: u8, cur: &mut Cursor<'_>) -> Result<Mutation> {
        let mutation = match discriminant {
            disc::ADD_VERTEX => Mutation::AddVertex {
                visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::ADD_EDGE => Mutation::AddEdge {
                label: lp::get_bytes(cur)?.to_vec(),
                out_vertex_id: lp::get_bytes(cur)?.to_vec(),
                in_vertex_id: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::ADD_EDGE_REF => Mutation::AddEdgeRef {
                label: lp::get_bytes(cur)?.to_vec(),
                other_vertex_id: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::SOFT_DELETE_EDGE_REF => Mutation::SoftDeleteEdgeRef {
                label: lp::get_bytes(cur)?.to_vec(),
                other_vertex_id: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::SET_PROPERTY => Mutation::SetProperty {
                key: lp::get_bytes(cur)?.to_vec(),
                name: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
                value: lp::get_bytes(cur)?.to_vec(),
            },
            disc::SOFT_DELETE_PROPERTY => Mutation::SoftDeleteProperty {
                key: lp::get_bytes(cur)?.to_vec(),
                name: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::SOFT_DELETE_ELEMENT => Mutation::SoftDeleteElement {
                visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::MARK_ELEMENT_HIDDEN => Mutation::MarkElementHidden {
                hidden_visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::MARK_ELEMENT_VISIBLE => Mutation::MarkElementVisible {
                hidden_visibility: lp::get_bytes(cur)?.to_vec(),
                payload: lp::get_bytes(cur)?.to_vec(),
            },
            disc::MARK_PROPERTY_HIDDEN => Mutation::MarkPropertyHidden {
                key: lp::get_bytes(cur)?.to_vec(),
                name: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
                hidden_visibility: lp::get_bytes(cur)?.to_vec(),
            },
            disc::MARK_PROPERTY_VISIBLE => Mutation::MarkPropertyVisible {
                key: lp::get_bytes(cur)?.to_vec(),
                name: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
                hidden_visibility: lp::get_bytes(cur)?.to_vec(),
                payload: lp::get_bytes(cur)?.to_vec(),
            },
            disc::SET_METADATA => Mutation::SetMetadata {
                key: lp::get_bytes(cur)?.to_vec(),
                name: lp::get_bytes(cur)?.to_vec(),
                metadata_name: lp::get_bytes(cur)?.to_vec(),
                visibility: lp::get_bytes(cur)?.to_vec(),
                value: lp::get_bytes(cur)?.to_vec(),
            },
            other => return Err(VeilError::UnknownDiscriminant(other)),
        };
        Ok(mutation)
    }

    /// The visibility expression that governs whether a caller may see
    /// this event in history mode.
    ///
    /// Mark events at the element level carry no value visibility of their
    /// own, so their hidden-visibility token governs; property-scoped
    /// events are governed by their property's visibility.
    pub fn governing_visibility(&self) -> &[u8] {
        match self {
            Mutation::AddVertex { visibility }
            | Mutation::AddEdge { visibility, .. }
            | Mutation::AddEdgeRef { visibility, .. }
            | Mutation::SoftDeleteEdgeRef { visibility, .. }
            | Mutation::SetProperty { visibility, .. }
            | Mutation::SoftDeleteProperty { visibility, .. }
            | Mutation::SoftDeleteElement { visibility }
            | Mutation::MarkPropertyHidden { visibility, .. }
            | Mutation::MarkPropertyVisible { visibility, .. }
            | Mutation::SetMetadata { visibility, .. } => visibility,
            Mutation::MarkElementHidden { hidden_visibility }
            | Mutation::MarkElementVisible {
                hidden_visibility, ..
            } => hidden_visibility,
        }
    }
}

/// Maps a discriminant byte to its facet without decoding the payload, so
/// out-of-scope records can be skipped cheaply.
pub(crate) fn facet_of(discriminant: u8) -> Result<Facet> {
    match discriminant {
        disc::ADD_VERTEX
        | disc::ADD_EDGE
        | disc::ADD_EDGE_REF
        | disc::SOFT_DELETE_EDGE_REF
        | disc::SOFT_DELETE_ELEMENT
        | disc::MARK_ELEMENT_HIDDEN
        | disc::MARK_ELEMENT_VISIBLE => Ok(Facet::Element),
        disc::SET_PROPERTY
        | disc::SOFT_DELETE_PROPERTY
        | disc::MARK_PROPERTY_HIDDEN
        | disc::MARK_PROPERTY_VISIBLE => Ok(Facet::Property),
        disc::SET_METADATA => Ok(Facet::PropertyMetadata),
        other => Err(VeilError::UnknownDiscriminant(other)),
    }
}

/// One raw record for one element, as handed over by the storage host.
///
/// The payload is the discriminant byte followed by the variant fields;
/// element identity and timestamp live in the enclosing key and are
/// supplied out of band.
#[derive(Clone, Debug)]
pub struct RawRecord {
    /// Namespace of the element this record mutates.
    pub element_type: ElementType,
    /// Identity of the element this record mutates.
    pub element_id: ElementId,
    /// Logical write timestamp.
    pub timestamp: Timestamp,
    /// Discriminant byte plus type-specific payload.
    pub payload: Vec<u8>,
}

impl RawRecord {
    /// Builds a record by encoding `mutation` into a fresh payload.
    pub fn from_mutation(
        element_type: ElementType,
        element_id: impl Into<ElementId>,
        timestamp: Timestamp,
        mutation: &Mutation,
    ) -> Self {
        Self {
            element_type,
            element_id: element_id.into(),
            timestamp,
            payload: mutation.encode_to_vec(),
        }
    }
}

/// One fully-decoded history entry.
///
/// Totally ordered by `(timestamp, seq)`; `seq` is the arrival index the
/// resolver assigned within its scan, giving equal timestamps a stable
/// tie-break.
#[derive(Clone, Debug)]
pub struct HistoricalEvent {
    /// Namespace of the mutated element.
    pub element_type: ElementType,
    /// Identity of the mutated element.
    pub element_id: ElementId,
    /// Logical write timestamp.
    pub timestamp: Timestamp,
    /// Arrival index within the scan.
    pub seq: u64,
    /// The decoded mutation.
    pub mutation: Mutation,
}
