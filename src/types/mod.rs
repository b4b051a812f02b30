//! Core identifiers, timestamps, and the crate-wide error taxonomy.

use std::fmt;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VeilError>;

/// Namespace a stored element belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ElementType {
    /// A graph vertex.
    Vertex,
    /// A graph edge.
    Edge,
}

impl ElementType {
    /// Single-byte wire tag for this element type.
    pub fn to_byte(self) -> u8 {
        match self {
            ElementType::Vertex => 0x01,
            ElementType::Edge => 0x02,
        }
    }

    /// Decodes an element type from its wire tag.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(ElementType::Vertex),
            0x02 => Ok(ElementType::Edge),
            _ => Err(VeilError::Corruption("unknown element type tag")),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Vertex => write!(f, "vertex"),
            ElementType::Edge => write!(f, "edge"),
        }
    }
}

/// Opaque element identifier, unique within its [`ElementType`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ElementId(pub String);

impl ElementId {
    /// Creates an element id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Logical write timestamp assigned by the storage host.
///
/// Not wall-clock-unique; equal timestamps are ordered by arrival sequence
/// within a scan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp(pub u64);

/// Dense index assigned by a scan-scoped label dictionary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LabelIdx(pub u32);

/// Errors produced by record decoding and element resolution.
#[derive(Debug, Error)]
pub enum VeilError {
    /// A declared length exceeds the bytes remaining in the buffer.
    #[error("truncated input: declared {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the record declared it needed.
        needed: usize,
        /// Bytes actually remaining in the buffer.
        remaining: usize,
    },
    /// A dictionary lookup missed; the record and dictionary do not match.
    #[error("label index {0} not present in dictionary")]
    InvalidLabelIndex(u32),
    /// An unregistered mutation type byte, likely writer/reader version skew.
    #[error("unknown mutation discriminant 0x{0:02X}")]
    UnknownDiscriminant(u8),
    /// Malformed record contents.
    #[error("corruption detected: {0}")]
    Corruption(&'static str),
    /// A decode failure wrapped with the identity of the element being
    /// resolved.
    #[error("corrupt record for {element_type} \"{element_id}\"")]
    CorruptRecord {
        /// Type of the element whose resolution failed.
        element_type: ElementType,
        /// Identity of the element whose resolution failed.
        element_id: ElementId,
        /// The underlying decode failure.
        #[source]
        source: Box<VeilError>,
    },
    /// Caller misuse of the engine API.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

impl VeilError {
    /// Wraps a decode failure with the identity of the element being
    /// resolved. Already-wrapped errors pass through unchanged.
    pub(crate) fn for_element(self, element_type: ElementType, element_id: &ElementId) -> VeilError {
        match self {
            VeilError::CorruptRecord { .. } => self,
            other => VeilError::CorruptRecord {
                element_type,
                element_id: element_id.clone(),
                source: Box::new(other),
            },
        }
    }
}
