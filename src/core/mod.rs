//! Core domain models for pipeline configuration.
//!
//! This module contains the fundamental data structures: typed parameter
//! records, task nodes and the pipeline DAG.

pub mod dag;
pub mod params;
pub mod task;

pub use dag::{GraphState, PipelineGraph, DEFAULT_ROOT_SENTINELS};
pub use params::{Number, ParameterRecord, Value, ValueKind};
pub use task::{AxisRange, BoundingBox, TaskCatalog, TaskKind, TaskNode, UpstreamRef, UpstreamRole};
