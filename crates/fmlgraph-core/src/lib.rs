//! fmlgraph Core Library
//!
//! This crate provides the data side of fmlgraph:
//! - Schema catalog lookups over StructureDefinitions
//! - The mapping graph (objects, rules, connections) and its mutators
//! - Evaluation ordering over a graph
//! - StructureMap document types and the round-trip payload
//! - Project configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ StructureMap │◀───▶│  MapGraph   │────▶│  Evaluation  │
//! │   (JSON)     │     │  (groups)   │     │    order     │
//! └──────────────┘     └─────────────┘     └──────────────┘
//!                             ▲
//!                      ┌──────┴──────┐
//!                      │   Schema    │
//!                      │   catalog   │
//!                      └─────────────┘
//! ```
//!
//! The translation between the two representations lives in
//! `fmlgraph-translate`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod sequence;
pub mod snapshot;

pub use catalog::{MatchType, Resolved, SchemaCatalog, SchemaDefinition};
pub use config::{Config, ProjectConfig};
pub use document::StructureMap;
pub use error::{Error, Result};
pub use graph::{Connection, Group, MapGraph, ObjectMode, Rule, RuleParameter, SchemaObject, VarRef};
pub use snapshot::GraphSnapshot;
