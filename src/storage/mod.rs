//! Storage-tier element state resolution.
//!
//! Implements the push-down filter that folds one element's ordered,
//! visibility-tagged mutation log into its current authorized state or its
//! authorized history.

/// Scan-scoped string interning for labels and property names.
pub mod dictionary;

/// The tagged mutation model and its append-only discriminant registry.
pub mod mutation;

mod edge;
mod resolver;
mod types;

/// Compact adjacency record encoding.
pub use edge::EdgeInfo;

/// Resolution contexts and entry points.
pub use resolver::{
    resolve, resolve_current, resolve_history, ElementResolver, HistoryIter, HistoryResolver,
    Resolution,
};

/// Resolution configuration and output types.
pub use types::{
    EdgeEndpoints, ResolveMode, ResolveOptions, ResolvedElement, ResolvedMetadata,
    ResolvedProperty, ScopeFilter,
};
