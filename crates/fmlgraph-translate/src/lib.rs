//! fmlgraph Translation
//!
//! This crate converts between the two forms of a mapping: the nested rule
//! tree of a FHIR StructureMap and the flat [`MapGraph`] of objects, rules,
//! and connections.
//!
//! # Pipeline Overview
//!
//! ```text
//! ┌──────────────┐  parse   ┌──────────┐  compose  ┌──────────────┐
//! │ StructureMap │─────────▶│ MapGraph │──────────▶│ StructureMap │
//! │  rule tree   │          │  groups  │           │ + fml-export │
//! └──────────────┘          └──────────┘           └──────────────┘
//! ```
//!
//! Each transform kind has its own parse and compose handler in
//! [`transforms`]; unknown kinds go through the default handler.
//!
//! # Example
//!
//! ```rust,ignore
//! use fmlgraph_translate::{compose, parse, ComposeOptions, ParseOptions};
//!
//! let outcome = parse(&map, &catalog, &ParseOptions::default())?;
//! let rebuilt = compose(&outcome.graph, &ComposeOptions::default())?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod composer;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod parser;
pub mod transforms;

pub use composer::{ComposeOptions, compose, compose_string};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{Error, Result};
pub use fmlgraph_core::MapGraph;
pub use parser::{ParseOptions, ParseOutcome, parse, parse_str};
