//! Pipeline configuration model for plant 3D-reconstruction task graphs.
//!
//! A pipeline document is a TOML file with one section per task. The
//! [`Loader`] turns it into a validated [`PipelineGraph`], or into a single
//! error listing everything wrong with the document.

pub mod config;
pub mod core;
pub mod error;
pub mod loader;
pub mod log;
pub mod render;

pub use crate::core::{
    BoundingBox, GraphState, ParameterRecord, PipelineGraph, TaskKind, TaskNode, UpstreamRole,
    Value, ValueKind,
};
pub use error::{Error, Issue, Result};
pub use loader::{Loader, LoaderConfig, RoleRegistry};
pub use render::DependencyFigure;
