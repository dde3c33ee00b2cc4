//! Task node model for the pipeline graph.
//!
//! A task node is one section of a pipeline document: a named stage, its
//! parameters, the upstream tasks it reads from and an optional bounding box.

use crate::core::params::ParameterRecord;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// The role an upstream reference plays for the task that declares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamRole {
    /// The task's main input (`upstream_task`).
    Primary,
    /// Image masks (`upstream_mask`).
    Mask,
    /// Camera poses and intrinsics (`upstream_colmap`).
    CameraGeometry,
    /// Any other registered or generic `upstream_<role>` key.
    Other(String),
}

impl UpstreamRole {
    /// Parse a role name as written in configuration files.
    pub fn from_name(name: &str) -> Self {
        match name {
            "primary" | "task" => UpstreamRole::Primary,
            "mask" => UpstreamRole::Mask,
            "camera_geometry" | "colmap" => UpstreamRole::CameraGeometry,
            other => UpstreamRole::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for UpstreamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamRole::Primary => write!(f, "primary"),
            UpstreamRole::Mask => write!(f, "mask"),
            UpstreamRole::CameraGeometry => write!(f, "camera_geometry"),
            UpstreamRole::Other(role) => write!(f, "{}", role),
        }
    }
}

/// A role-tagged reference to another task or to a root sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRef {
    /// The document key the reference was declared under, e.g. `upstream_mask`.
    pub key: String,
    pub role: UpstreamRole,
    /// Name of the referenced task or root sentinel.
    pub target: String,
}

/// Implicit node type, looked up from the task catalog by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Calibration,
    Image,
    Geometry,
    Analysis,
    Maintenance,
    /// Root sentinel standing for data that exists outside the pipeline.
    External,
    Unknown,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskKind::Calibration => "calibration",
            TaskKind::Image => "image",
            TaskKind::Geometry => "geometry",
            TaskKind::Analysis => "analysis",
            TaskKind::Maintenance => "maintenance",
            TaskKind::External => "external",
            TaskKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "calibration" => Ok(TaskKind::Calibration),
            "image" => Ok(TaskKind::Image),
            "geometry" => Ok(TaskKind::Geometry),
            "analysis" => Ok(TaskKind::Analysis),
            "maintenance" => Ok(TaskKind::Maintenance),
            "unknown" => Ok(TaskKind::Unknown),
            other => Err(Error::Config(format!("unknown task kind '{}'", other))),
        }
    }
}

/// Known task names and their kinds.
#[derive(Debug, Clone)]
pub struct TaskCatalog {
    kinds: HashMap<String, TaskKind>,
}

impl TaskCatalog {
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, kind: TaskKind) -> &mut Self {
        self.kinds.insert(name.into(), kind);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Kind for `name`, `Unknown` when the catalog has no entry.
    pub fn kind_of(&self, name: &str) -> TaskKind {
        self.kinds.get(name).copied().unwrap_or(TaskKind::Unknown)
    }
}

impl Default for TaskCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        for name in ["Colmap", "IntrinsicCalibration", "ExtrinsicCalibration"] {
            catalog.register(name, TaskKind::Calibration);
        }
        for name in ["Undistorted", "Masks", "Segmentation2D"] {
            catalog.register(name, TaskKind::Image);
        }
        for name in [
            "Voxels",
            "PointCloud",
            "SegmentedPointCloud",
            "TriangleMesh",
            "CurveSkeleton",
            "TreeGraph",
        ] {
            catalog.register(name, TaskKind::Geometry);
        }
        for name in ["AnglesAndInternodes", "FruitDirection", "StemDirection"] {
            catalog.register(name, TaskKind::Analysis);
        }
        catalog.register("Clean", TaskKind::Maintenance);
        catalog
    }
}

/// Closed `[min, max]` interval on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Region of interest in scan coordinates. A missing axis is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: Option<AxisRange>,
    pub y: Option<AxisRange>,
    pub z: Option<AxisRange>,
}

impl BoundingBox {
    pub fn axes(&self) -> [(&'static str, Option<AxisRange>); 3] {
        [("x", self.x), ("y", self.y), ("z", self.z)]
    }

    pub fn axis_mut(&mut self, axis: &str) -> Option<&mut Option<AxisRange>> {
        match axis {
            "x" => Some(&mut self.x),
            "y" => Some(&mut self.y),
            "z" => Some(&mut self.z),
            _ => None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// One stage of a reconstruction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskNode {
    /// Section name, unique within a pipeline.
    pub name: String,
    pub kind: TaskKind,
    /// Upstream references in declaration order.
    pub upstream: Vec<UpstreamRef>,
    pub parameters: ParameterRecord,
    pub bounding_box: Option<BoundingBox>,
}

impl TaskNode {
    /// Create a task with no parameters and no upstream references.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TaskKind::Unknown,
            upstream: Vec::new(),
            parameters: ParameterRecord::new(),
            bounding_box: None,
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add an upstream reference declared under `key`.
    pub fn with_upstream(mut self, key: &str, role: UpstreamRole, target: &str) -> Self {
        self.upstream.push(UpstreamRef {
            key: key.to_string(),
            role,
            target: target.to_string(),
        });
        self
    }

    pub fn with_parameters(mut self, parameters: ParameterRecord) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }

    /// Referenced task names in declaration order.
    pub fn upstream_names(&self) -> Vec<&str> {
        self.upstream.iter().map(|r| r.target.as_str()).collect()
    }

    /// Check the node on its own, independent of the rest of the graph.
    ///
    /// # Errors
    /// `InvalidNode` listing every violation found.
    pub fn validate_self(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.name.trim().is_empty() {
            violations.push("task name is empty".to_string());
        }

        let mut seen = HashSet::new();
        for reference in &self.upstream {
            if reference.target == self.name {
                violations.push(format!("'{}' references the task itself", reference.key));
            }
            if !seen.insert(reference.target.as_str()) {
                violations.push(format!(
                    "duplicate upstream reference to '{}' ('{}')",
                    reference.target, reference.key
                ));
            }
        }

        if let Some(bbox) = &self.bounding_box {
            for (axis, range) in bbox.axes() {
                let Some(range) = range else { continue };
                if !range.min.is_finite() || !range.max.is_finite() {
                    violations.push(format!("bounding_box.{} has a non-finite bound", axis));
                } else if range.min > range.max {
                    violations.push(format!(
                        "bounding_box.{}: min {} is greater than max {}",
                        axis, range.min, range.max
                    ));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidNode {
                name: self.name.clone(),
                violations,
            })
        }
    }
}
