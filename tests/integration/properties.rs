//! Guarantees that hold for every document, checked over families of
//! generated pipelines.

use std::collections::{HashMap, HashSet};

use plantpipe::{Error, GraphState};

use crate::fixtures::{
    chain_document, edge_set, issues_of, layered_document, load_ok, loader, order_of, GEOM_PIPE,
};

/// Cyclic documents of growing length: T0 reads from Tn-1, Ti reads from Ti-1.
fn ring_document(len: usize, tail: usize) -> String {
    let mut doc = String::new();
    for i in 0..len {
        let upstream = (i + len - 1) % len;
        doc.push_str(&format!("[T{i}]\nupstream_task = \"T{upstream}\"\n\n"));
    }
    for j in 0..tail {
        let upstream = if j == 0 { "T0".to_string() } else { format!("X{}", j - 1) };
        doc.push_str(&format!("[X{j}]\nupstream_task = \"{upstream}\"\n\n"));
    }
    doc
}

fn assert_order_respects_edges(source: &str) {
    let graph = load_ok(source);
    let position: HashMap<String, usize> = order_of(&graph)
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, i))
        .collect();

    assert_eq!(position.len(), graph.node_count());
    for (from, to, _) in edge_set(&graph) {
        assert!(
            position[&from] < position[&to],
            "{from} must come before {to}"
        );
    }
}

/// Test: Topological order
/// Given valid documents of several shapes
/// When they are loaded
/// Then every task comes strictly after all of its upstream tasks
#[test]
fn test_topological_order_respects_every_edge() {
    assert_order_respects_edges(GEOM_PIPE);
    for len in [1, 2, 7, 30] {
        assert_order_respects_edges(&chain_document(len));
    }
    for (layers, width) in [(2, 2), (4, 3), (6, 5)] {
        assert_order_respects_edges(&layered_document(layers, width));
    }
    // Declared bottom-up: every reference points forward.
    assert_order_respects_edges(
        "[D]\nupstream_task = \"C\"\n[C]\nupstream_task = \"B\"\nupstream_mask = \"A\"\n[B]\nupstream_task = \"A\"\n[A]\n",
    );
}

/// Test: Cycle paths
/// Given rings of several lengths, some with tasks hanging off them
/// When they are loaded
/// Then the reported path is closed and each step is a declared reference
#[test]
fn test_cycle_path_is_closed_and_follows_references() {
    for (len, tail) in [(1, 0), (2, 0), (3, 2), (8, 1)] {
        let source = ring_document(len, tail);
        let issues = issues_of(&source);
        let path = issues
            .iter()
            .find_map(|issue| match &issue.error {
                Error::CycleDetected { path } => Some(path.clone()),
                _ => None,
            })
            .expect("cycle should be reported");

        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), len + 1);

        // Rebuild the declared references to check each step of the path.
        let mut builder = plantpipe::PipelineGraph::new();
        for i in 0..len {
            let node = plantpipe::TaskNode::new(&format!("T{i}")).with_upstream(
                "upstream_task",
                plantpipe::UpstreamRole::Primary,
                &format!("T{}", (i + len - 1) % len),
            );
            builder.add_node(node).unwrap();
        }
        for pair in path.windows(2) {
            let reader = builder.get(&pair[0]).unwrap();
            assert!(
                reader.upstream_names().contains(&pair[1].as_str()),
                "{} does not read from {}",
                pair[0],
                pair[1]
            );
        }
    }
}

/// Test: Rejected graphs stay open
/// Given a graph whose references form a cycle
/// When edges are resolved
/// Then it stays in Building and refuses ordering queries
#[test]
fn test_failed_resolution_keeps_graph_building() {
    let mut graph = plantpipe::PipelineGraph::new();
    graph
        .add_node(plantpipe::TaskNode::new("A").with_upstream(
            "upstream_task",
            plantpipe::UpstreamRole::Primary,
            "B",
        ))
        .unwrap();
    graph
        .add_node(plantpipe::TaskNode::new("B").with_upstream(
            "upstream_task",
            plantpipe::UpstreamRole::Primary,
            "A",
        ))
        .unwrap();

    assert!(graph.resolve_edges().is_err());
    assert_eq!(graph.state(), GraphState::Building);
    assert_eq!(graph.edge_count(), 0);
    assert!(matches!(graph.topological_order(), Err(Error::NotValidated)));
}

/// Test: Frozen graphs
/// Given a validated graph
/// When another task is added
/// Then GraphFrozen is returned and the graph is unchanged
#[test]
fn test_validated_graph_is_frozen() {
    let mut graph = load_ok(GEOM_PIPE);
    let before = graph.node_count();

    let err = graph.add_node(plantpipe::TaskNode::new("Clean")).unwrap_err();
    assert!(matches!(err, Error::GraphFrozen));
    assert_eq!(graph.node_count(), before);
    assert!(!graph.contains("Clean"));
}

/// Test: Idempotent loading
/// Given the same document text
/// When it is loaded twice
/// Then both graphs have the same nodes, edges and order
#[test]
fn test_loading_twice_gives_identical_graphs() {
    for source in [GEOM_PIPE.to_string(), layered_document(5, 4)] {
        let first = load_ok(&source);
        let second = load_ok(&source);

        let names = |g: &plantpipe::PipelineGraph| -> Vec<String> {
            g.nodes().map(|n| n.name.clone()).collect()
        };
        assert_eq!(names(&first), names(&second));
        assert_eq!(edge_set(&first), edge_set(&second));
        assert_eq!(order_of(&first), order_of(&second));
        for node in first.nodes() {
            assert_eq!(Some(node), second.get(&node.name));
        }
    }
}

/// Test: Duplicate names
/// Given documents repeating sections one or more times
/// When they are loaded
/// Then exactly one DuplicateName is reported per repeat
#[test]
fn test_one_duplicate_issue_per_repeat() {
    for repeats in [1usize, 2, 4] {
        let mut source = String::from("[Masks]\nupstream_task = \"root\"\n\n");
        for i in 0..repeats {
            source.push_str(&format!("[Masks]\nthreshold = 0.{i}\n\n"));
        }
        source.push_str("[Voxels]\nupstream_mask = \"Masks\"\n\n[Voxels]\nvoxel_size = 1.0\n");

        let issues = issues_of(&source);
        let mut per_name: HashMap<&str, usize> = HashMap::new();
        for issue in &issues {
            if let Error::DuplicateName(name) = &issue.error {
                *per_name.entry(name.as_str()).or_default() += 1;
            }
        }
        assert_eq!(per_name.get("Masks"), Some(&repeats));
        assert_eq!(per_name.get("Voxels"), Some(&1));
    }
}

/// Test: Roots and leaves
/// Given a layered pipeline
/// When roots and leaves are queried
/// Then they are exactly the first and last layers
#[test]
fn test_roots_and_leaves_of_layers() {
    let graph = load_ok(&layered_document(3, 3));
    let names = |nodes: Vec<&plantpipe::TaskNode>| -> HashSet<String> {
        nodes.into_iter().map(|n| n.name.clone()).collect()
    };

    assert_eq!(
        names(graph.roots()),
        HashSet::from(["L0_0".to_string(), "L0_1".to_string(), "L0_2".to_string()])
    );
    assert_eq!(
        names(graph.leaves()),
        HashSet::from(["L2_0".to_string(), "L2_1".to_string(), "L2_2".to_string()])
    );
    assert_eq!(graph.default_target().unwrap().name, "L2_2");
    assert_eq!(graph.downstream_of("L0_1").len(), 2);
    assert!(loader().load(&layered_document(3, 3)).is_ok());
}
