//! Document scenarios: what loads, what is rejected and how it is reported.

use plantpipe::{Error, TaskKind, UpstreamRole, ValueKind};

use crate::fixtures::{issues_of, load_ok, order_of, GEOM_PIPE, GEOM_PIPE_TASKS};

/// Test: Two-task chain
/// Given [A] reading from the root sentinel and [B] reading from A
/// When the document is loaded
/// Then it validates with order [A, B]
#[test]
fn test_chain_from_root_sentinel() {
    let graph = load_ok("[A]\nupstream_task = \"root\"\n\n[B]\nupstream_task = \"A\"\n");

    assert!(graph.is_validated());
    assert_eq!(order_of(&graph), vec!["A", "B"]);
    assert_eq!(graph.referenced_sentinels(), vec!["root"]);
    assert_eq!(graph.edge_count(), 1);
}

/// Test: Two-task cycle
/// Given [A] reading from B and [B] reading from A
/// When the document is loaded
/// Then the load fails with a cycle reported as [A, B, A]
#[test]
fn test_two_task_cycle_is_reported() {
    let issues = issues_of("[A]\nupstream_task = \"B\"\n\n[B]\nupstream_task = \"A\"\n");

    assert_eq!(issues.len(), 1);
    match &issues[0].error {
        Error::CycleDetected { path } => assert_eq!(path, &vec!["A", "B", "A"]),
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert_eq!(issues[0].section.as_deref(), Some("A"));
    assert_eq!(issues[0].to_string(), "[A] Cycle detected: A -> B -> A");
}

/// Test: Dangling reference
/// Given [A] reading from "Missing", which is neither a task nor a sentinel
/// When the document is loaded
/// Then the load fails with UnknownUpstream("A", "Missing")
#[test]
fn test_missing_upstream_is_reported() {
    let issues = issues_of("[A]\nupstream_task = \"Missing\"\n");

    assert_eq!(issues.len(), 1);
    assert!(matches!(
        &issues[0].error,
        Error::UnknownUpstream { node, missing } if node == "A" && missing == "Missing"
    ));
}

/// Test: Full reconstruction pipeline
/// Given the scanner geometry pipeline
/// When it is loaded
/// Then every task, role, parameter and bounding box comes through
#[test]
fn test_geometry_pipeline_loads() {
    let graph = load_ok(GEOM_PIPE);

    let declared: Vec<&str> = graph.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(declared, GEOM_PIPE_TASKS);
    assert_eq!(order_of(&graph), GEOM_PIPE_TASKS);

    let colmap = graph.get("Colmap").unwrap();
    assert_eq!(colmap.kind, TaskKind::Calibration);
    assert_eq!(colmap.parameters.get_str("matcher").unwrap(), "exhaustive");
    assert!(!colmap.parameters.get_bool("compute_dense").unwrap());
    let extractor = colmap
        .parameters
        .get_record("cli_args")
        .and_then(|cli| cli.get_record("feature_extractor"))
        .unwrap();
    assert_eq!(extractor.get_str("SiftExtraction.use_gpu").unwrap(), "1");

    let masks = graph.get("Masks").unwrap();
    assert_eq!(masks.parameters.get_numbers("parameters").unwrap(), vec![0.0, 1.0, 0.0]);
    assert_eq!(masks.parameters.get_int("dilation").unwrap(), 5);
    // Integers widen to floats on request.
    assert_eq!(masks.parameters.get_float("dilation").unwrap(), 5.0);

    let voxels = graph.get("Voxels").unwrap();
    let roles: Vec<_> = voxels.upstream.iter().map(|r| r.role.clone()).collect();
    assert_eq!(roles, vec![UpstreamRole::Mask, UpstreamRole::CameraGeometry]);
    let bbox = voxels.bounding_box.unwrap();
    assert_eq!(bbox.z.map(|z| (z.min, z.max)), Some((-175.0, 105.0)));

    let undistorted: Vec<&str> = graph
        .upstream_of("Undistorted")
        .into_iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(undistorted, vec!["Colmap"]);
}

/// Test: Parameter lookups on a loaded task
/// Given the geometry pipeline
/// When parameters are read with the wrong type or a missing key
/// Then TypeMismatch and MissingParameter name the key
#[test]
fn test_parameter_errors_on_loaded_task() {
    let graph = load_ok(GEOM_PIPE);
    let tree = &graph.get("TreeGraph").unwrap().parameters;

    assert_eq!(tree.get_int("z_axis").unwrap(), 2);
    assert!(matches!(
        tree.get_str("z_axis"),
        Err(Error::TypeMismatch { ref key, expected: ValueKind::String, actual: ValueKind::Integer })
            if key == "z_axis"
    ));
    assert!(matches!(
        tree.get_float("stem_axis"),
        Err(Error::MissingParameter { ref key }) if key == "stem_axis"
    ));
}

/// Test: Plans and default target on the geometry pipeline
/// Given the geometry pipeline
/// When a plan is requested for PointCloud and for the default target
/// Then the plan holds exactly the upstream closure in execution order
#[test]
fn test_execution_plans() {
    let graph = load_ok(GEOM_PIPE);

    let plan: Vec<&str> = graph
        .execution_plan("PointCloud")
        .unwrap()
        .into_iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(plan, vec!["Colmap", "Undistorted", "Masks", "Voxels", "PointCloud"]);

    let target = graph.default_target().unwrap();
    assert_eq!(target.name, "AnglesAndInternodes");
    assert_eq!(graph.execution_plan(&target.name).unwrap().len(), 9);

    assert!(matches!(
        graph.execution_plan("Segmentation2D"),
        Err(Error::TaskNotFound(ref name)) if name == "Segmentation2D"
    ));
}

/// Test: Forward references
/// Given a task that reads from a section declared later
/// When the document is loaded
/// Then it validates and the later section runs first
#[test]
fn test_forward_reference_is_allowed() {
    let graph = load_ok("[B]\nupstream_task = \"A\"\n[A]\nupstream_task = \"root\"\n");
    assert_eq!(order_of(&graph), vec!["A", "B"]);
    assert_eq!(graph.roots()[0].name, "A");
    assert_eq!(graph.leaves()[0].name, "B");
}

/// Test: Task shadowing a sentinel
/// Given a section named like a root sentinel
/// When another task reads from that name
/// Then the reference resolves to the task, not the sentinel
#[test]
fn test_task_named_like_sentinel_wins() {
    let graph = load_ok("[root]\nsource = \"scanner\"\n[A]\nupstream_task = \"root\"\n");
    assert_eq!(graph.edge_count(), 1);
    assert!(graph.referenced_sentinels().is_empty());
    assert_eq!(order_of(&graph), vec!["root", "A"]);
}

/// Test: One-shot report
/// Given a document with problems in several sections
/// When it is loaded
/// Then every problem is listed in a single report
#[test]
fn test_every_problem_is_reported_at_once() {
    let source = r#"
[Colmap]
upstream_task = "ImagesFilesetExists"
matcher = { kind = "exhaustive" }

[Masks]
upstream_task = "Undistorted"
parameters = ["a", "b"]

[Voxels]
upstream_mask = "Masks"
upstream_colmap = "Voxels"

[Voxels.bounding_box]
x = [450, 300]

[PointCloud]
upstream_task = "Voxels"

[PointCloud]
upstream_task = "Voxels"
"#;
    let err = crate::fixtures::loader().load(source).unwrap_err();
    let report = err.to_string();
    let issues = err.issues();

    assert!(report.starts_with(&format!("Pipeline document has {} issue(s):", issues.len())));
    assert!(issues
        .iter()
        .any(|i| matches!(&i.error, Error::UnknownUpstream { missing, .. } if missing == "Undistorted")));
    assert!(issues
        .iter()
        .any(|i| matches!(&i.error, Error::MalformedValue { key, .. } if key == "parameters")));
    assert!(issues
        .iter()
        .any(|i| matches!(&i.error, Error::InvalidNode { name, violations }
            if name == "Voxels" && violations.len() == 2)));
    assert!(issues
        .iter()
        .any(|i| matches!(&i.error, Error::DuplicateName(name) if name == "PointCloud")));
    // Inline tables are nested records, not malformed values.
    assert!(!issues.iter().any(|i| i.section.as_deref() == Some("Colmap")));
}

/// Test: Unknown nesting
/// Given keys before the first section and an array of tables
/// When the document is loaded
/// Then both are reported without a section
#[test]
fn test_unknown_nesting() {
    let issues = issues_of("version = 2\n\n[A]\nupstream_task = \"root\"\n\n[[A.runs]]\nid = 1\n");
    assert_eq!(issues.len(), 2);
    assert!(issues
        .iter()
        .all(|i| i.section.is_none() && matches!(i.error, Error::UnknownNesting(_))));
}
