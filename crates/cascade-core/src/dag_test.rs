use super::*;

fn deps_map(entries: &[(&str, &[&str])]) -> BTreeMap<ModelName, BTreeSet<ModelName>> {
    entries
        .iter()
        .map(|(name, deps)| {
            (
                ModelName::new(*name),
                deps.iter().map(|d| ModelName::new(*d)).collect(),
            )
        })
        .collect()
}

#[test]
fn test_build_simple_chain() {
    let dag = DependencyGraph::build(&deps_map(&[
        ("a", &[]),
        ("b", &["a"]),
        ("c", &["b"]),
    ]))
    .unwrap();

    let batches = dag.topological_batches().unwrap();
    assert_eq!(
        batches,
        vec![
            vec![ModelName::new("a")],
            vec![ModelName::new("b")],
            vec![ModelName::new("c")],
        ]
    );
}

#[test]
fn test_batches_alphabetical_tie_break() {
    let dag = DependencyGraph::build(&deps_map(&[
        ("zeta", &[]),
        ("alpha", &[]),
        ("mid", &["alpha", "zeta"]),
    ]))
    .unwrap();

    let batches = dag.topological_batches().unwrap();
    assert_eq!(
        batches[0],
        vec![ModelName::new("alpha"), ModelName::new("zeta")]
    );
    assert_eq!(batches[1], vec![ModelName::new("mid")]);
}

#[test]
fn test_batches_deterministic() {
    let map = deps_map(&[
        ("a", &[]),
        ("b", &[]),
        ("c", &["a", "b"]),
        ("d", &["c"]),
        ("e", &["a"]),
    ]);
    let first = DependencyGraph::build(&map).unwrap().topological_batches().unwrap();
    for _ in 0..10 {
        let again = DependencyGraph::build(&map).unwrap().topological_batches().unwrap();
        assert_eq!(first, again);
    }
}

#[test]
fn test_cycle_detected_with_path() {
    let err = DependencyGraph::build(&deps_map(&[("a", &["b"]), ("b", &["a"])])).unwrap_err();
    match err {
        CoreError::CircularDependency { cycle } => {
            assert!(cycle.contains("a"));
            assert!(cycle.contains("b"));
            assert!(cycle.contains("->"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_self_cycle_detected() {
    let err = DependencyGraph::build(&deps_map(&[("a", &["a"])])).unwrap_err();
    assert!(matches!(err, CoreError::CircularDependency { .. }));
}

#[test]
fn test_unknown_edge_target_rejected() {
    let err = DependencyGraph::build(&deps_map(&[("a", &["ghost"])])).unwrap_err();
    match err {
        CoreError::UnknownReference { model, target } => {
            assert_eq!(model, "a");
            assert_eq!(target, "ghost");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_direct_neighbours() {
    let dag = DependencyGraph::build(&deps_map(&[
        ("a", &[]),
        ("b", &["a"]),
        ("c", &["a"]),
    ]))
    .unwrap();

    assert_eq!(dag.dependencies("b"), [ModelName::new("a")].into());
    assert_eq!(
        dag.dependents("a"),
        [ModelName::new("b"), ModelName::new("c")].into()
    );
    assert!(dag.dependencies("a").is_empty());
}

#[test]
fn test_transitive_closures() {
    let dag = DependencyGraph::build(&deps_map(&[
        ("a", &[]),
        ("b", &["a"]),
        ("c", &["b"]),
        ("d", &["c"]),
    ]))
    .unwrap();

    assert_eq!(
        dag.transitive_deps("d"),
        ["a", "b", "c"].map(ModelName::new).into()
    );
    assert_eq!(
        dag.transitive_dependents("a"),
        ["b", "c", "d"].map(ModelName::new).into()
    );
    // Memoised second call returns the same answer
    assert_eq!(dag.transitive_deps("d"), dag.transitive_deps("d"));
}

#[test]
fn test_cache_invalidated_on_mutation() {
    let mut dag = DependencyGraph::build(&deps_map(&[("a", &[]), ("b", &["a"])])).unwrap();
    assert_eq!(dag.transitive_dependents("a").len(), 1);

    dag.add_edge("c", "a");
    assert_eq!(
        dag.transitive_dependents("a"),
        ["b", "c"].map(ModelName::new).into()
    );

    dag.remove_vertex("c");
    assert_eq!(dag.transitive_dependents("a").len(), 1);
}

#[test]
fn test_remove_vertex() {
    let mut dag = DependencyGraph::build(&deps_map(&[("a", &[]), ("b", &["a"])])).unwrap();
    dag.remove_vertex("b");
    assert!(!dag.contains("b"));
    assert!(dag.dependents("a").is_empty());
    assert_eq!(dag.len(), 1);
}

#[test]
fn test_restricted_batches() {
    let dag = DependencyGraph::build(&deps_map(&[
        ("a", &[]),
        ("b", &["a"]),
        ("c", &["b"]),
    ]))
    .unwrap();

    // Only b and c selected: b has no in-subset deps, so it leads
    let subset: BTreeSet<ModelName> = ["b", "c"].map(ModelName::new).into();
    let batches = dag.topological_batches_for(&subset).unwrap();
    assert_eq!(
        batches,
        vec![vec![ModelName::new("b")], vec![ModelName::new("c")]]
    );
}

#[test]
fn test_restricted_batches_ignore_unknown_names() {
    let dag = DependencyGraph::build(&deps_map(&[("a", &[])])).unwrap();
    let subset: BTreeSet<ModelName> = ["a", "ghost"].map(ModelName::new).into();
    let batches = dag.topological_batches_for(&subset).unwrap();
    assert_eq!(batches, vec![vec![ModelName::new("a")]]);
}

#[test]
fn test_diamond_batches() {
    let dag = DependencyGraph::build(&deps_map(&[
        ("base", &[]),
        ("left", &["base"]),
        ("right", &["base"]),
        ("top", &["left", "right"]),
    ]))
    .unwrap();

    let batches = dag.topological_batches().unwrap();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0], vec![ModelName::new("base")]);
    assert_eq!(
        batches[1],
        vec![ModelName::new("left"), ModelName::new("right")]
    );
    assert_eq!(batches[2], vec![ModelName::new("top")]);
}

#[test]
fn test_to_dot() {
    let dag = DependencyGraph::build(&deps_map(&[("a", &[]), ("b", &["a"])])).unwrap();
    let dot = dag.to_dot();
    assert!(dot.starts_with("digraph dependencies {"));
    assert!(dot.contains("\"a\" -> \"b\";"));
    assert!(dot.ends_with('}'));
}
