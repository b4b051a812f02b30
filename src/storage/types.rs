use crate::security::{Authorizations, Visibility};
use crate::storage::edge::EdgeInfo;
use crate::storage::mutation::Facet;
use crate::types::{ElementId, ElementType, Timestamp};

/// The set of element facets a resolution is restricted to.
///
/// Excluding a facet lets the engine skip decoding its records entirely.
/// This is an optimization, never a correctness requirement: omitting a
/// facet never changes the result for the facets that remain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScopeFilter {
    bits: u8,
}

impl ScopeFilter {
    const ELEMENT: u8 = 1 << 0;
    const PROPERTY: u8 = 1 << 1;
    const PROPERTY_METADATA: u8 = 1 << 2;

    /// Every facet included.
    pub fn all() -> Self {
        Self {
            bits: Self::ELEMENT | Self::PROPERTY | Self::PROPERTY_METADATA,
        }
    }

    /// No facet included; combine with [`ScopeFilter::with`].
    pub fn none() -> Self {
        Self { bits: 0 }
    }

    /// Only element existence, visibility, and adjacency.
    pub fn element_only() -> Self {
        Self::none().with(Facet::Element)
    }

    /// Returns a copy with `facet` included.
    pub fn with(self, facet: Facet) -> Self {
        Self {
            bits: self.bits | Self::bit(facet),
        }
    }

    /// Returns a copy with `facet` excluded.
    pub fn without(self, facet: Facet) -> Self {
        Self {
            bits: self.bits & !Self::bit(facet),
        }
    }

    /// True when records of `facet` should be decoded.
    pub fn includes(self, facet: Facet) -> bool {
        self.bits & Self::bit(facet) != 0
    }

    fn bit(facet: Facet) -> u8 {
        match facet {
            Facet::Element => Self::ELEMENT,
            Facet::Property => Self::PROPERTY,
            Facet::PropertyMetadata => Self::PROPERTY_METADATA,
        }
    }
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Whether a resolution reduces to current state or replays history.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResolveMode {
    /// Reduce the stream to the latest authorized state.
    #[default]
    Current,
    /// Emit every authorized event in timestamp order.
    History,
}

/// Configuration the host supplies for one element resolution.
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    /// Tokens the caller presents.
    pub authorizations: Authorizations,
    /// Facets to resolve.
    pub scope: ScopeFilter,
    /// Current-state or history resolution.
    pub mode: ResolveMode,
}

impl ResolveOptions {
    /// Options for the given caller with every facet in scope, in
    /// current-state mode.
    pub fn new(authorizations: Authorizations) -> Self {
        Self {
            authorizations,
            scope: ScopeFilter::all(),
            mode: ResolveMode::Current,
        }
    }

    /// Restricts the facets to resolve.
    pub fn scope(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }

    /// Switches between current-state and history resolution.
    pub fn mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One metadata entry attached to a resolved property.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedMetadata {
    /// Metadata entry name bytes.
    pub name: Vec<u8>,
    /// Opaque metadata value bytes.
    pub value: Vec<u8>,
    /// Timestamp of the winning metadata write.
    pub timestamp: Timestamp,
}

/// The latest authorized, non-deleted, non-hidden value of one property
/// slot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedProperty {
    /// Property key bytes.
    pub key: Vec<u8>,
    /// Property name bytes.
    pub name: Vec<u8>,
    /// Opaque value bytes of the winning write.
    pub value: Vec<u8>,
    /// Visibility of this value.
    pub visibility: Visibility,
    /// Timestamp of the winning write.
    pub timestamp: Timestamp,
    /// Metadata entries attached to this slot, ordered by name.
    pub metadata: Vec<ResolvedMetadata>,
}

/// Endpoint info for a resolved edge element.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeEndpoints {
    /// Edge label.
    pub label: String,
    /// Identifier of the out-endpoint vertex.
    pub out_vertex_id: String,
    /// Identifier of the in-endpoint vertex.
    pub in_vertex_id: String,
}

/// The materialized current state of one element, filtered to what the
/// caller is authorized to see.
///
/// Created fresh per resolution call; never persisted by the engine.
#[derive(Clone, Debug)]
pub struct ResolvedElement {
    /// Namespace of the element.
    pub element_type: ElementType,
    /// Identity of the element.
    pub element_id: ElementId,
    /// Visibility of the element itself.
    pub visibility: Visibility,
    /// Timestamp of the winning element signal.
    pub timestamp: Timestamp,
    /// Authorized live properties, ordered by (key, name, visibility).
    pub properties: Vec<ResolvedProperty>,
    /// Authorized live adjacency records (vertices only).
    pub edge_refs: Vec<EdgeInfo>,
    /// Endpoint info (edge elements only).
    pub endpoints: Option<EdgeEndpoints>,
}

impl ResolvedElement {
    /// Looks up the resolved value for an exact (key, name) pair.
    pub fn property(&self, key: &[u8], name: &[u8]) -> Option<&ResolvedProperty> {
        self.properties
            .iter()
            .find(|p| p.key == key && p.name == name)
    }

    /// Iterates every resolved value carrying the given name, across keys.
    pub fn properties_named<'a>(
        &'a self,
        name: &'a [u8],
    ) -> impl Iterator<Item = &'a ResolvedProperty> + 'a {
        self.properties.iter().filter(move |p| p.name == name)
    }
}
