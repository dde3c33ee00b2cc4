//! Integration test suite for plantpipe.
//!
//! These tests load complete pipeline documents through the public API and
//! check the resulting graphs end to end.
//!
//! # Test Categories
//!
//! - `scenarios`: Documents that load, and documents that must be rejected
//! - `properties`: Ordering, cycle, duplicate and idempotence guarantees
//! - `documents`: Files on disk, re-serialization and concurrent loads
//! - `performance`: Load and ordering time on large generated pipelines


mod scenarios;
mod properties;
