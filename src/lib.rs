//! # Annotation Search
//!
//! Search layer of a collaborative annotation service: builds permission-scoped
//! queries for an Elasticsearch-compatible index and manages that index's
//! analysis settings, mappings and alias.
//!
//! - [`search`]: analysis, index lifecycle, filter/matcher registry, query
//!   builder, backend clients
//! - [`config`]: layered configuration (embedded defaults, file, environment)
//! - [`error`]: application-level error type

pub mod config;
pub mod error;
pub mod search;

pub use config::Config;
pub use error::{AppError, Result};
