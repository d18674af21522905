//! # searchsync-types
//!
//! Shared value types for the searchsync indexing pipeline.
//!
//! This crate defines the data structures every other crate agrees on:
//! - [`Field`]: one exported attribute of a document, with its source path
//! - [`IndexDefinition`]: the per-index class inclusion and field specs
//! - [`WireDocument`]: the flat key/value map exchanged with backends
//! - [`Settings`]: layered runtime configuration
//! - [`ConfigError`]: configuration-class failures

pub mod error;
pub mod field;
pub mod index;
pub mod settings;
pub mod wire;

pub use error::ConfigError;
pub use field::{validate_field_name, Field};
pub use index::{load_index_definitions, parse_index_definitions, ClassSpec, FieldSpec, IndexDefinition, IndexDefinitions};
pub use settings::Settings;
pub use wire::{is_scalar, IndexMethod, WireDocument};
