//! Marrow core
//!
//! Data model shared by the Marrow runtime: the definition arena, the
//! context (dynamic scope) stack, constructions and instantiations, the
//! keep store, and the boundary contracts for host objects and collections.

#[macro_use]
pub mod macros;

pub mod collection;
pub mod collections;
pub mod config;
pub mod construction;
pub mod context;
pub mod def;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod host;
pub mod instantiation;
pub mod keep;
pub mod name;
pub mod value;

// Re-export commonly used items for convenience
pub use tracing;

pub use construction::{Construction, ConstructionKind, EvalMode};
pub use context::{Context, ContextEntry, ContextMarker};
pub use def::{DefId, DefRef, Definition, DefinitionTable};
pub use instantiation::{Instantiation, ResolutionKind};
pub use value::Value;

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
