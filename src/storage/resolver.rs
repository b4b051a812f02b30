#![forbid(unsafe_code)]

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::primitives::bytes::buf::Cursor;
use crate::security::{Authorizations, Visibility};
use crate::storage::dictionary::{DictMetricsSnapshot, LabelDict};
use crate::storage::edge::EdgeInfo;
use crate::storage::mutation::{disc, facet_of, Facet, HistoricalEvent, Mutation, RawRecord};
use crate::storage::types::{
    EdgeEndpoints, ResolveMode, ResolveOptions, ResolvedElement, ResolvedMetadata,
    ResolvedProperty, ScopeFilter,
};
use crate::types::{ElementId, ElementType, LabelIdx, Result, Timestamp, VeilError};

/// Write stamp: timestamp plus arrival sequence. Tuple comparison gives
/// last-write-wins with a stable tie-break for equal timestamps.
type Stamp = (Timestamp, u64);

#[derive(Clone, Debug)]
struct Stamped<T> {
    stamp: Stamp,
    value: T,
}

impl<T> Stamped<T> {
    fn replace_if_newer(slot: &mut Option<Stamped<T>>, stamp: Stamp, value: T) {
        if slot.as_ref().map_or(true, |held| stamp > held.stamp) {
            *slot = Some(Stamped { stamp, value });
        }
    }
}

/// Hide/un-hide state for one hidden-visibility token.
///
/// Tracked as two high-water timestamps rather than a last-writer flag so
/// the outcome is independent of delivery order; a tie between a hide and
/// an un-hide resolves to hidden (fail closed).
#[derive(Clone, Debug)]
struct HiddenMark {
    token: Vec<u8>,
    hide: Option<Timestamp>,
    unhide: Option<Timestamp>,
}

impl HiddenMark {
    fn hidden(&self) -> bool {
        match (self.hide, self.unhide) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(hide), Some(unhide)) => hide >= unhide,
        }
    }
}

/// Most slots see at most one hidden-visibility token.
type HiddenMarks = SmallVec<[HiddenMark; 2]>;

fn apply_mark(marks: &mut HiddenMarks, token: &[u8], timestamp: Timestamp, hidden: bool) {
    let mark = match marks.iter_mut().find(|m| m.token == token) {
        Some(mark) => mark,
        None => {
            marks.push(HiddenMark {
                token: token.to_vec(),
                hide: None,
                unhide: None,
            });
            marks.last_mut().expect("just pushed")
        }
    };
    let high_water = if hidden { &mut mark.hide } else { &mut mark.unhide };
    if high_water.map_or(true, |held| timestamp > held) {
        *high_water = Some(timestamp);
    }
}

fn is_hidden_for(marks: &HiddenMarks, authorizations: &Authorizations) -> bool {
    marks
        .iter()
        .any(|m| m.hidden() && authorizations.can_read(&m.token))
}

/// Identity of one property value slot.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct SlotKey {
    key: Vec<u8>,
    name: Vec<u8>,
    visibility: Vec<u8>,
}

#[derive(Debug, Default)]
struct PropSlot {
    set: Option<Stamped<Vec<u8>>>,
    /// Latest tombstone timestamp. Tombstones compare by timestamp alone:
    /// a delete wins against equal-or-older sets and loses to strictly
    /// newer ones.
    tombstone: Option<Timestamp>,
    marks: HiddenMarks,
    metadata: FxHashMap<Vec<u8>, Stamped<Vec<u8>>>,
}

#[derive(Debug, Default)]
struct EdgeRefSlot {
    /// Winning add, carrying the referenced edge's visibility.
    add: Option<Stamped<Vec<u8>>>,
    tombstone: Option<Timestamp>,
}

/// Raw endpoint fields of an edge signal; validated as UTF-8 at emit.
#[derive(Clone, Debug)]
struct RawEndpoints {
    label: Vec<u8>,
    out_vertex_id: Vec<u8>,
    in_vertex_id: Vec<u8>,
}

#[derive(Clone, Debug)]
struct Signal {
    visibility: Vec<u8>,
    endpoints: Option<RawEndpoints>,
}

fn max_ts(slot: &mut Option<Timestamp>, timestamp: Timestamp) {
    if slot.map_or(true, |held| timestamp > held) {
        *slot = Some(timestamp);
    }
}

/// Current-state resolution context for one element.
///
/// Feed records with [`ElementResolver::apply`] in any timestamp order
/// (the fold is comparison-driven, never order-dependent), then call
/// [`ElementResolver::finish`]. Stopping early and finishing is a normal
/// terminal condition: the result covers whatever was fed. Each resolver
/// owns its dictionary and accumulators; construct one per element, use it
/// from one thread.
pub struct ElementResolver {
    element_type: ElementType,
    element_id: ElementId,
    authorizations: Authorizations,
    scope: ScopeFilter,
    dict: LabelDict,
    seq: u64,
    signal: Option<Stamped<Signal>>,
    element_tombstone: Option<Timestamp>,
    element_marks: HiddenMarks,
    slots: FxHashMap<SlotKey, PropSlot>,
    edge_refs: FxHashMap<(LabelIdx, Vec<u8>), EdgeRefSlot>,
}

impl ElementResolver {
    /// Creates a resolution context for the given element. The mode field
    /// of `options` is ignored; this context always reduces to current
    /// state.
    pub fn new(
        element_type: ElementType,
        element_id: impl Into<ElementId>,
        options: ResolveOptions,
    ) -> Self {
        Self {
            element_type,
            element_id: element_id.into(),
            authorizations: options.authorizations,
            scope: options.scope,
            dict: LabelDict::new(),
            seq: 0,
            signal: None,
            element_tombstone: None,
            element_marks: HiddenMarks::new(),
            slots: FxHashMap::default(),
            edge_refs: FxHashMap::default(),
        }
    }

    /// Dictionary activity counters for this scan.
    pub fn dictionary_metrics(&self) -> DictMetricsSnapshot {
        self.dict.metrics_snapshot()
    }

    /// Folds one raw record into the accumulated state.
    ///
    /// Records outside the configured scope are skipped before payload
    /// decode. Any decode failure aborts resolution for this element with
    /// [`VeilError::CorruptRecord`].
    pub fn apply(&mut self, record: &RawRecord) -> Result<()> {
        if record.element_type != self.element_type || record.element_id != self.element_id {
            return Err(VeilError::Invalid("record belongs to a different element"));
        }
        let seq = self.seq;
        self.seq += 1;

        let mut cur = Cursor::new(&record.payload);
        let discriminant = cur.u8().map_err(|e| self.corrupt(e))?;
        let facet = facet_of(discriminant).map_err(|e| self.corrupt(e))?;
        if self.skips(discriminant, facet) {
            trace!(disc = discriminant, "resolver.skip.out_of_scope");
            return Ok(());
        }
        let mutation = Mutation::decode_body(discriminant, &mut cur)
            .and_then(|m| cur.expect_end().map(|()| m))
            .map_err(|e| self.corrupt(e))?;
        self.fold(mutation, (record.timestamp, seq))
    }

    fn corrupt(&self, source: VeilError) -> VeilError {
        source.for_element(self.element_type, &self.element_id)
    }

    /// Scope skipping is an optimization and must never change the
    /// correctness of in-scope facets. Element liveness records (signals,
    /// element tombstones, element hide marks) govern every facet, so they
    /// are folded even when the ELEMENT facet is out of scope; only the
    /// high-volume adjacency records are skipped for it.
    fn skips(&self, discriminant: u8, facet: Facet) -> bool {
        if self.scope.includes(facet) {
            return false;
        }
        match facet {
            Facet::Element => matches!(
                discriminant,
                disc::ADD_EDGE_REF | disc::SOFT_DELETE_EDGE_REF
            ),
            Facet::Property | Facet::PropertyMetadata => true,
        }
    }

    fn intern_label(&mut self, label: &[u8]) -> Result<LabelIdx> {
        let label = std::str::from_utf8(label).map_err(|_| {
            self.corrupt(VeilError::Corruption("edge label not valid UTF-8"))
        })?;
        Ok(self.dict.intern(label))
    }

    fn fold(&mut self, mutation: Mutation, stamp: Stamp) -> Result<()> {
        match mutation {
            Mutation::AddVertex { visibility } => {
                if self.element_type != ElementType::Vertex {
                    return Err(
                        self.corrupt(VeilError::Corruption("vertex signal on an edge element"))
                    );
                }
                Stamped::replace_if_newer(
                    &mut self.signal,
                    stamp,
                    Signal {
                        visibility,
                        endpoints: None,
                    },
                );
            }
            Mutation::AddEdge {
                label,
                out_vertex_id,
                in_vertex_id,
                visibility,
            } => {
                if self.element_type != ElementType::Edge {
                    return Err(
                        self.corrupt(VeilError::Corruption("edge signal on a vertex element"))
                    );
                }
                Stamped::replace_if_newer(
                    &mut self.signal,
                    stamp,
                    Signal {
                        visibility,
                        endpoints: Some(RawEndpoints {
                            label,
                            out_vertex_id,
                            in_vertex_id,
                        }),
                    },
                );
            }
            Mutation::AddEdgeRef {
                label,
                other_vertex_id,
                visibility,
            } => {
                let idx = self.intern_label(&label)?;
                let slot = self.edge_refs.entry((idx, other_vertex_id)).or_default();
                Stamped::replace_if_newer(&mut slot.add, stamp, visibility);
            }
            Mutation::SoftDeleteEdgeRef {
                label,
                other_vertex_id,
                ..
            } => {
                let idx = self.intern_label(&label)?;
                let slot = self.edge_refs.entry((idx, other_vertex_id)).or_default();
                max_ts(&mut slot.tombstone, stamp.0);
            }
            Mutation::SetProperty {
                key,
                name,
                visibility,
                value,
            } => {
                let slot = self.slot(key, name, visibility);
                Stamped::replace_if_newer(&mut slot.set, stamp, value);
            }
            Mutation::SoftDeleteProperty {
                key,
                name,
                visibility,
            } => {
                let slot = self.slot(key, name, visibility);
                max_ts(&mut slot.tombstone, stamp.0);
            }
            Mutation::SoftDeleteElement { .. } => {
                max_ts(&mut self.element_tombstone, stamp.0);
            }
            Mutation::MarkElementHidden { hidden_visibility } => {
                apply_mark(&mut self.element_marks, &hidden_visibility, stamp.0, true);
            }
            Mutation::MarkElementVisible {
                hidden_visibility, ..
            } => {
                apply_mark(&mut self.element_marks, &hidden_visibility, stamp.0, false);
            }
            Mutation::MarkPropertyHidden {
                key,
                name,
                visibility,
                hidden_visibility,
            } => {
                let slot = self.slot(key, name, visibility);
                apply_mark(&mut slot.marks, &hidden_visibility, stamp.0, true);
            }
            Mutation::MarkPropertyVisible {
                key,
                name,
                visibility,
                hidden_visibility,
                ..
            } => {
                let slot = self.slot(key, name, visibility);
                apply_mark(&mut slot.marks, &hidden_visibility, stamp.0, false);
            }
            Mutation::SetMetadata {
                key,
                name,
                metadata_name,
                visibility,
                value,
            } => {
                let slot = self.slot(key, name, visibility);
                let entry = slot.metadata.entry(metadata_name).or_insert(Stamped {
                    stamp,
                    value: Vec::new(),
                });
                if stamp >= entry.stamp {
                    *entry = Stamped { stamp, value };
                }
            }
        }
        Ok(())
    }

    fn slot(&mut self, key: Vec<u8>, name: Vec<u8>, visibility: Vec<u8>) -> &mut PropSlot {
        self.slots
            .entry(SlotKey {
                key,
                name,
                visibility,
            })
            .or_default()
    }

    /// Emits the authorization-filtered current state.
    ///
    /// Returns `Ok(None)` when the element has no live signal, was soft
    /// deleted, is hidden for this caller, or carries a visibility the
    /// caller cannot read. Suppressed and unauthorized values are absent
    /// from the output entirely, never marked.
    pub fn finish(self) -> Result<Option<ResolvedElement>> {
        let authorizations = &self.authorizations;
        let Some(signal) = &self.signal else {
            trace!(element = %self.element_id, "resolver.current.no_signal");
            return Ok(None);
        };
        if let Some(deleted) = self.element_tombstone {
            if deleted >= signal.stamp.0 {
                trace!(element = %self.element_id, "resolver.current.deleted");
                return Ok(None);
            }
        }
        if is_hidden_for(&self.element_marks, authorizations) {
            trace!(element = %self.element_id, "resolver.current.hidden");
            return Ok(None);
        }
        if !authorizations.can_read(&signal.value.visibility) {
            trace!(element = %self.element_id, "resolver.current.unauthorized");
            return Ok(None);
        }

        let suppressed_at = self.element_tombstone;
        let mut properties = Vec::new();
        for (slot_key, slot) in &self.slots {
            let Some(set) = &slot.set else { continue };
            if let Some(deleted) = slot.tombstone {
                if deleted >= set.stamp.0 {
                    continue;
                }
            }
            if let Some(deleted) = suppressed_at {
                if deleted >= set.stamp.0 {
                    continue;
                }
            }
            if is_hidden_for(&slot.marks, authorizations) {
                continue;
            }
            if !authorizations.can_read(&slot_key.visibility) {
                continue;
            }
            let mut metadata: Vec<ResolvedMetadata> = slot
                .metadata
                .iter()
                .map(|(name, held)| ResolvedMetadata {
                    name: name.clone(),
                    value: held.value.clone(),
                    timestamp: held.stamp.0,
                })
                .collect();
            metadata.sort_by(|a, b| a.name.cmp(&b.name));
            properties.push(ResolvedProperty {
                key: slot_key.key.clone(),
                name: slot_key.name.clone(),
                value: set.value.clone(),
                visibility: Visibility::new(slot_key.visibility.clone()),
                timestamp: set.stamp.0,
                metadata,
            });
        }
        properties.sort_by(|a, b| {
            (&a.key, &a.name, a.visibility.as_bytes())
                .cmp(&(&b.key, &b.name, b.visibility.as_bytes()))
        });

        let mut edge_refs = Vec::new();
        for ((label_idx, other_vertex_id), slot) in &self.edge_refs {
            let Some(add) = &slot.add else { continue };
            if let Some(deleted) = slot.tombstone {
                if deleted >= add.stamp.0 {
                    continue;
                }
            }
            if let Some(deleted) = suppressed_at {
                if deleted >= add.stamp.0 {
                    continue;
                }
            }
            if !authorizations.can_read(&add.value) {
                continue;
            }
            let label = self.dict.resolve(*label_idx)?.to_owned();
            let other_vertex_id = String::from_utf8(other_vertex_id.clone()).map_err(|_| {
                VeilError::Corruption("edge ref vertex id not valid UTF-8")
                    .for_element(self.element_type, &self.element_id)
            })?;
            edge_refs.push(EdgeInfo {
                label,
                other_vertex_id,
                timestamp: add.stamp.0,
            });
        }
        edge_refs.sort_by(|a, b| {
            (&a.label, &a.other_vertex_id).cmp(&(&b.label, &b.other_vertex_id))
        });

        let endpoints = match &signal.value.endpoints {
            Some(raw) => Some(EdgeEndpoints {
                label: utf8_field(&raw.label, self.element_type, &self.element_id)?,
                out_vertex_id: utf8_field(&raw.out_vertex_id, self.element_type, &self.element_id)?,
                in_vertex_id: utf8_field(&raw.in_vertex_id, self.element_type, &self.element_id)?,
            }),
            None => None,
        };

        debug!(
            element = %self.element_id,
            properties = properties.len(),
            edge_refs = edge_refs.len(),
            "resolver.current.emit"
        );
        Ok(Some(ResolvedElement {
            element_type: self.element_type,
            element_id: self.element_id.clone(),
            visibility: Visibility::new(signal.value.visibility.clone()),
            timestamp: signal.stamp.0,
            properties,
            edge_refs,
            endpoints,
        }))
    }
}

fn utf8_field(
    bytes: &[u8],
    element_type: ElementType,
    element_id: &ElementId,
) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        VeilError::Corruption("edge endpoint field not valid UTF-8")
            .for_element(element_type, element_id)
    })
}

/// History resolution context for one element.
///
/// Buffers decoded events, then [`HistoryResolver::finish`] orders them by
/// `(timestamp, seq)` and hands back a lazily-filtered iterator. History
/// never suppresses a superseded event; supersession is a current-state
/// concept only.
pub struct HistoryResolver {
    element_type: ElementType,
    element_id: ElementId,
    authorizations: Authorizations,
    scope: ScopeFilter,
    seq: u64,
    events: Vec<HistoricalEvent>,
}

impl HistoryResolver {
    /// Creates a history context for the given element. The mode field of
    /// `options` is ignored; this context always replays history.
    pub fn new(
        element_type: ElementType,
        element_id: impl Into<ElementId>,
        options: ResolveOptions,
    ) -> Self {
        Self {
            element_type,
            element_id: element_id.into(),
            authorizations: options.authorizations,
            scope: options.scope,
            seq: 0,
            events: Vec::new(),
        }
    }

    /// Decodes and buffers one raw record.
    pub fn apply(&mut self, record: &RawRecord) -> Result<()> {
        if record.element_type != self.element_type || record.element_id != self.element_id {
            return Err(VeilError::Invalid("record belongs to a different element"));
        }
        let seq = self.seq;
        self.seq += 1;

        let corrupt = |e: VeilError| e.for_element(record.element_type, &record.element_id);
        let mut cur = Cursor::new(&record.payload);
        let discriminant = cur.u8().map_err(corrupt)?;
        let facet = facet_of(discriminant).map_err(corrupt)?;
        if !self.scope.includes(facet) {
            trace!(disc = discriminant, "resolver.skip.out_of_scope");
            return Ok(());
        }
        let mutation = Mutation::decode_body(discriminant, &mut cur)
            .and_then(|m| cur.expect_end().map(|()| m))
            .map_err(corrupt)?;
        self.events.push(HistoricalEvent {
            element_type: record.element_type,
            element_id: record.element_id.clone(),
            timestamp: record.timestamp,
            seq,
            mutation,
        });
        Ok(())
    }

    /// Orders the buffered events and returns the authorized timeline.
    pub fn finish(self) -> HistoryIter {
        let mut events = self.events;
        events.sort_by_key(|e| (e.timestamp, e.seq));
        debug!(
            element = %self.element_id,
            events = events.len(),
            "resolver.history.emit"
        );
        HistoryIter {
            inner: events.into_iter(),
            authorizations: self.authorizations,
        }
    }
}

/// Lazily-filtered, timestamp-ordered history sequence.
///
/// Finite; restartable only by re-resolving from the beginning of the
/// source stream.
pub struct HistoryIter {
    inner: std::vec::IntoIter<HistoricalEvent>,
    authorizations: Authorizations,
}

impl Iterator for HistoryIter {
    type Item = HistoricalEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = self.inner.next()?;
            if self
                .authorizations
                .can_read(event.mutation.governing_visibility())
            {
                return Some(event);
            }
            trace!(
                ts = event.timestamp.0,
                "resolver.history.filtered"
            );
        }
    }
}

/// The output of a mode-dispatched [`resolve`] call.
#[derive(Debug)]
pub enum Resolution {
    /// Current-state result.
    Current(Option<ResolvedElement>),
    /// Authorized history, materialized in order.
    History(Vec<HistoricalEvent>),
}

/// Resolves one element's record stream to its current authorized state.
pub fn resolve_current<I>(
    element_type: ElementType,
    element_id: impl Into<ElementId>,
    records: I,
    options: ResolveOptions,
) -> Result<Option<ResolvedElement>>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut resolver = ElementResolver::new(element_type, element_id, options);
    for record in records {
        resolver.apply(&record)?;
    }
    resolver.finish()
}

/// Resolves one element's record stream to its authorized history.
pub fn resolve_history<I>(
    element_type: ElementType,
    element_id: impl Into<ElementId>,
    records: I,
    options: ResolveOptions,
) -> Result<HistoryIter>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut resolver = HistoryResolver::new(element_type, element_id, options);
    for record in records {
        resolver.apply(&record)?;
    }
    Ok(resolver.finish())
}

/// Mode-dispatched resolution over the host-configured options.
pub fn resolve<I>(
    element_type: ElementType,
    element_id: impl Into<ElementId>,
    records: I,
    options: ResolveOptions,
) -> Result<Resolution>
where
    I: IntoIterator<Item = RawRecord>,
{
    match options.mode {
        ResolveMode::Current => Ok(Resolution::Current(resolve_current(
            element_type,
            element_id,
            records,
            options,
        )?)),
        ResolveMode::History => Ok(Resolution::History(
            resolve_history(element_type, element_id, records, options)?.collect(),
        )),
    }
}
