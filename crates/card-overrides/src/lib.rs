//! Configuration overrides
//!
//! This crate computes the *effective* card configuration: a base
//! configuration tree with conditional override rules applied on top.
//!
//! # Key Types
//!
//! - [`ConfigPath`] - A parsed `a.b[2].c` path into a configuration tree
//! - [`OverrideRule`] - `{conditions, set?, merge?, delete?}`
//! - [`OverrideCompiler`] - Applies rules in order, validating the result
//! - [`ConfigSchema`] - Compiled JSON Schema for the effective configuration

pub mod compiler;
pub mod error;
pub mod path;
pub mod schema;
pub mod tree;

pub use compiler::{OverrideCompiler, OverrideRule};
pub use error::{
    ConfigOverrideError, ConfigPathError, OverrideError, OverrideResult, ValidationIssue,
};
pub use path::{ConfigPath, PathSegment};
pub use schema::ConfigSchema;
