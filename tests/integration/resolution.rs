#![allow(clippy::all)]

use veilgraph::security::Authorizations;
use veilgraph::storage::mutation::{Facet, Mutation, RawRecord};
use veilgraph::storage::{
    resolve, resolve_current, resolve_history, ElementResolver, Resolution, ResolveMode,
    ResolveOptions, ResolvedElement, ScopeFilter,
};
use veilgraph::types::{ElementType, Timestamp, VeilError};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn vertex(id: &str, ts: u64, mutation: Mutation) -> RawRecord {
    RawRecord::from_mutation(ElementType::Vertex, id, Timestamp(ts), &mutation)
}

fn add_vertex(id: &str, ts: u64, visibility: &str) -> RawRecord {
    vertex(
        id,
        ts,
        Mutation::AddVertex {
            visibility: visibility.as_bytes().to_vec(),
        },
    )
}

fn set_property(id: &str, ts: u64, name: &str, visibility: &str, value: &str) -> RawRecord {
    vertex(
        id,
        ts,
        Mutation::SetProperty {
            key: b"a".to_vec(),
            name: name.as_bytes().to_vec(),
            visibility: visibility.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        },
    )
}

fn soft_delete_property(id: &str, ts: u64, name: &str, visibility: &str) -> RawRecord {
    vertex(
        id,
        ts,
        Mutation::SoftDeleteProperty {
            key: b"a".to_vec(),
            name: name.as_bytes().to_vec(),
            visibility: visibility.as_bytes().to_vec(),
        },
    )
}

fn add_edge_ref(id: &str, ts: u64, label: &str, other: &str, visibility: &str) -> RawRecord {
    vertex(
        id,
        ts,
        Mutation::AddEdgeRef {
            label: label.as_bytes().to_vec(),
            other_vertex_id: other.as_bytes().to_vec(),
            visibility: visibility.as_bytes().to_vec(),
        },
    )
}

fn options(tokens: &[&str]) -> ResolveOptions {
    ResolveOptions::new(Authorizations::new(tokens.iter().copied()))
}

fn assert_same_state(left: &Option<ResolvedElement>, right: &Option<ResolvedElement>) {
    match (left, right) {
        (None, None) => {}
        (Some(l), Some(r)) => {
            assert_eq!(l.visibility, r.visibility);
            assert_eq!(l.timestamp, r.timestamp);
            assert_eq!(l.properties, r.properties);
            assert_eq!(l.edge_refs, r.edge_refs);
            assert_eq!(l.endpoints, r.endpoints);
        }
        (l, r) => panic!("states diverge: {:?} vs {:?}", l.is_some(), r.is_some()),
    }
}

#[test]
fn soft_deleted_property_is_absent_from_current_state_but_kept_in_history() {
    init_tracing();
    let records = vec![
        add_vertex("a", 1, ""),
        set_property("a", 10, "name1", "", "A"),
        soft_delete_property("a", 20, "name1", ""),
    ];

    let current = resolve_current(ElementType::Vertex, "a", records.clone(), options(&[]))
        .unwrap()
        .unwrap();
    assert!(current.property(b"a", b"name1").is_none());
    assert!(current.properties.is_empty());

    let history: Vec<_> = resolve_history(ElementType::Vertex, "a", records, options(&[]))
        .unwrap()
        .collect();
    let property_events: Vec<_> = history
        .iter()
        .filter(|e| {
            matches!(
                e.mutation,
                Mutation::SetProperty { .. } | Mutation::SoftDeleteProperty { .. }
            )
        })
        .collect();
    assert_eq!(property_events.len(), 2);
    assert!(matches!(
        property_events[0].mutation,
        Mutation::SetProperty { .. }
    ));
    assert_eq!(property_events[0].timestamp, Timestamp(10));
    assert!(matches!(
        property_events[1].mutation,
        Mutation::SoftDeleteProperty { .. }
    ));
    assert_eq!(property_events[1].timestamp, Timestamp(20));
}

#[test]
fn mark_hidden_then_mark_visible_restores_the_property() {
    let hide = vertex(
        "v1",
        20,
        Mutation::MarkPropertyHidden {
            key: b"a".to_vec(),
            name: b"name1".to_vec(),
            visibility: Vec::new(),
            hidden_visibility: Vec::new(),
        },
    );
    let unhide = vertex(
        "v1",
        30,
        Mutation::MarkPropertyVisible {
            key: b"a".to_vec(),
            name: b"name1".to_vec(),
            visibility: Vec::new(),
            hidden_visibility: Vec::new(),
            payload: b"hide-audit".to_vec(),
        },
    );
    let base = vec![add_vertex("v1", 1, ""), set_property("v1", 10, "name1", "", "A")];

    let mut hidden_only = base.clone();
    hidden_only.push(hide.clone());
    let resolved = resolve_current(ElementType::Vertex, "v1", hidden_only, options(&[]))
        .unwrap()
        .unwrap();
    assert!(resolved.property(b"a", b"name1").is_none());

    let mut toggled = base;
    toggled.push(hide);
    toggled.push(unhide);
    let resolved = resolve_current(ElementType::Vertex, "v1", toggled, options(&[]))
        .unwrap()
        .unwrap();
    assert_eq!(resolved.property(b"a", b"name1").unwrap().value, b"A");
}

#[test]
fn replaying_authorized_history_reconstructs_current_state() {
    init_tracing();
    let records = vec![
        add_vertex("v1", 1, ""),
        set_property("v1", 10, "email", "pii", "a@example.com"),
        set_property("v1", 11, "age", "", "30"),
        soft_delete_property("v1", 12, "age", ""),
        set_property("v1", 13, "age", "", "31"),
        vertex(
            "v1",
            14,
            Mutation::MarkPropertyHidden {
                key: b"a".to_vec(),
                name: b"email".to_vec(),
                visibility: b"pii".to_vec(),
                hidden_visibility: b"audit".to_vec(),
            },
        ),
        vertex(
            "v1",
            15,
            Mutation::MarkPropertyVisible {
                key: b"a".to_vec(),
                name: b"email".to_vec(),
                visibility: b"pii".to_vec(),
                hidden_visibility: b"audit".to_vec(),
                payload: Vec::new(),
            },
        ),
        add_edge_ref("v1", 16, "knows", "v2", ""),
    ];

    for tokens in [&["pii", "audit"][..], &["pii"][..], &[][..]] {
        let direct = resolve_current(
            ElementType::Vertex,
            "v1",
            records.clone(),
            options(tokens),
        )
        .unwrap();

        let events =
            resolve_history(ElementType::Vertex, "v1", records.clone(), options(tokens)).unwrap();
        let mut replay = ElementResolver::new(ElementType::Vertex, "v1", options(tokens));
        for event in events {
            let record = RawRecord::from_mutation(
                event.element_type,
                event.element_id.clone(),
                event.timestamp,
                &event.mutation,
            );
            replay.apply(&record).unwrap();
        }
        let replayed = replay.finish().unwrap();
        assert_same_state(&direct, &replayed);
    }
}

#[test]
fn resolution_tolerates_either_scan_direction() {
    let forward = vec![
        add_vertex("v1", 1, ""),
        set_property("v1", 10, "name1", "", "old"),
        set_property("v1", 20, "name1", "", "new"),
        soft_delete_property("v1", 15, "name1", ""),
        add_edge_ref("v1", 16, "knows", "v2", ""),
        add_edge_ref("v1", 17, "knows", "v3", ""),
        vertex(
            "v1",
            18,
            Mutation::SoftDeleteEdgeRef {
                label: b"knows".to_vec(),
                other_vertex_id: b"v3".to_vec(),
                visibility: Vec::new(),
            },
        ),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();

    let a = resolve_current(ElementType::Vertex, "v1", forward, options(&[])).unwrap();
    let b = resolve_current(ElementType::Vertex, "v1", reversed, options(&[])).unwrap();
    assert_same_state(&a, &b);

    let resolved = a.unwrap();
    assert_eq!(resolved.property(b"a", b"name1").unwrap().value, b"new");
    assert_eq!(resolved.edge_refs.len(), 1);
    assert_eq!(resolved.edge_refs[0].other_vertex_id, "v2");
}

#[test]
fn scope_filter_skips_facets_without_touching_the_rest() {
    let records = vec![
        add_vertex("v1", 1, ""),
        set_property("v1", 10, "name1", "", "A"),
        add_edge_ref("v1", 11, "knows", "v2", ""),
    ];

    let element_only = options(&[]).scope(ScopeFilter::element_only());
    let resolved = resolve_current(ElementType::Vertex, "v1", records.clone(), element_only)
        .unwrap()
        .unwrap();
    assert!(resolved.properties.is_empty());
    assert_eq!(resolved.edge_refs.len(), 1);

    let no_element = options(&[]).scope(ScopeFilter::all().without(Facet::Element));
    let resolved = resolve_current(ElementType::Vertex, "v1", records.clone(), no_element)
        .unwrap()
        .unwrap();
    assert_eq!(resolved.properties.len(), 1);
    assert!(resolved.edge_refs.is_empty());

    // element liveness still governs excluded-facet resolutions
    let mut deleted = records;
    deleted.push(vertex(
        "v1",
        20,
        Mutation::SoftDeleteElement {
            visibility: Vec::new(),
        },
    ));
    let no_element = options(&[]).scope(ScopeFilter::all().without(Facet::Element));
    assert!(
        resolve_current(ElementType::Vertex, "v1", deleted, no_element)
            .unwrap()
            .is_none()
    );
}

#[test]
fn early_stream_end_is_a_normal_terminal_condition() {
    let records = vec![
        add_vertex("v1", 1, ""),
        set_property("v1", 10, "name1", "", "A"),
        soft_delete_property("v1", 20, "name1", ""),
    ];

    // host stopped supplying events before the tombstone arrived
    let mut resolver = ElementResolver::new(ElementType::Vertex, "v1", options(&[]));
    for record in &records[..2] {
        resolver.apply(record).unwrap();
    }
    let resolved = resolver.finish().unwrap().unwrap();
    assert_eq!(resolved.property(b"a", b"name1").unwrap().value, b"A");
}

#[test]
fn corrupt_records_abort_resolution_with_element_identity() {
    let mut truncated = Mutation::SetProperty {
        key: b"a".to_vec(),
        name: b"name1".to_vec(),
        visibility: Vec::new(),
        value: b"value".to_vec(),
    }
    .encode_to_vec();
    truncated.truncate(truncated.len() - 2);

    let mut resolver = ElementResolver::new(ElementType::Vertex, "v1", options(&[]));
    let err = resolver
        .apply(&RawRecord {
            element_type: ElementType::Vertex,
            element_id: "v1".into(),
            timestamp: Timestamp(5),
            payload: truncated,
        })
        .unwrap_err();
    match err {
        VeilError::CorruptRecord {
            element_id, source, ..
        } => {
            assert_eq!(element_id.as_str(), "v1");
            assert!(matches!(*source, VeilError::Truncated { .. }));
        }
        other => panic!("expected CorruptRecord, got {other:?}"),
    }

    let mut resolver = ElementResolver::new(ElementType::Vertex, "v1", options(&[]));
    let err = resolver
        .apply(&RawRecord {
            element_type: ElementType::Vertex,
            element_id: "v1".into(),
            timestamp: Timestamp(5),
            payload: vec![0xEE],
        })
        .unwrap_err();
    match err {
        VeilError::CorruptRecord { source, .. } => {
            assert!(matches!(*source, VeilError::UnknownDiscriminant(0xEE)));
        }
        other => panic!("expected CorruptRecord, got {other:?}"),
    }
}

#[test]
fn edge_element_resolves_endpoint_info() {
    let records = vec![
        RawRecord::from_mutation(
            ElementType::Edge,
            "e1",
            Timestamp(1),
            &Mutation::AddEdge {
                label: b"knows".to_vec(),
                out_vertex_id: b"v1".to_vec(),
                in_vertex_id: b"v2".to_vec(),
                visibility: Vec::new(),
            },
        ),
        RawRecord::from_mutation(
            ElementType::Edge,
            "e1",
            Timestamp(2),
            &Mutation::SetProperty {
                key: b"a".to_vec(),
                name: b"since".to_vec(),
                visibility: Vec::new(),
                value: b"2019".to_vec(),
            },
        ),
    ];

    let resolved = resolve_current(ElementType::Edge, "e1", records, options(&[]))
        .unwrap()
        .unwrap();
    let endpoints = resolved.endpoints.as_ref().expect("edge endpoints");
    assert_eq!(endpoints.label, "knows");
    assert_eq!(endpoints.out_vertex_id, "v1");
    assert_eq!(endpoints.in_vertex_id, "v2");
    assert_eq!(resolved.property(b"a", b"since").unwrap().value, b"2019");
}

#[test]
fn edge_ref_tombstone_matches_on_label_and_other_vertex() {
    let records = vec![
        add_vertex("v1", 1, ""),
        add_edge_ref("v1", 10, "knows", "v2", ""),
        add_edge_ref("v1", 10, "knows", "v3", ""),
        vertex(
            "v1",
            10,
            Mutation::SoftDeleteEdgeRef {
                label: b"knows".to_vec(),
                other_vertex_id: b"v2".to_vec(),
                visibility: Vec::new(),
            },
        ),
    ];
    let resolved = resolve_current(ElementType::Vertex, "v1", records.clone(), options(&[]))
        .unwrap()
        .unwrap();
    // equal-timestamp tombstone wins against the matching ref only
    assert_eq!(resolved.edge_refs.len(), 1);
    assert_eq!(resolved.edge_refs[0].other_vertex_id, "v3");

    let mut re_added = records;
    re_added.push(add_edge_ref("v1", 20, "knows", "v2", ""));
    let resolved = resolve_current(ElementType::Vertex, "v1", re_added, options(&[]))
        .unwrap()
        .unwrap();
    assert_eq!(resolved.edge_refs.len(), 2);
}

#[test]
fn mode_dispatch_follows_the_configured_options() {
    let records = vec![add_vertex("v1", 1, ""), set_property("v1", 10, "n", "", "x")];

    match resolve(
        ElementType::Vertex,
        "v1",
        records.clone(),
        options(&[]).mode(ResolveMode::Current),
    )
    .unwrap()
    {
        Resolution::Current(state) => assert!(state.is_some()),
        Resolution::History(_) => panic!("expected current-state resolution"),
    }

    match resolve(
        ElementType::Vertex,
        "v1",
        records,
        options(&[]).mode(ResolveMode::History),
    )
    .unwrap()
    {
        Resolution::History(events) => assert_eq!(events.len(), 2),
        Resolution::Current(_) => panic!("expected history resolution"),
    }
}

#[test]
fn dictionary_interns_repeated_edge_labels_once() {
    let mut resolver = ElementResolver::new(ElementType::Vertex, "v1", options(&[]));
    resolver.apply(&add_vertex("v1", 1, "")).unwrap();
    for i in 0..10 {
        resolver
            .apply(&add_edge_ref("v1", 10 + i, "knows", &format!("v{i}"), ""))
            .unwrap();
    }
    let metrics = resolver.dictionary_metrics();
    assert_eq!(metrics.intern_calls, 10);
    assert_eq!(metrics.intern_misses, 1);
    assert_eq!(metrics.intern_hits, 9);

    let resolved = resolver.finish().unwrap().unwrap();
    assert_eq!(resolved.edge_refs.len(), 10);
}
