//! Marrow interpreter
//!
//! Resolves references against a context, constructs definitions and
//! decides which results may be kept for reuse. Owns the process-wide state
//! of a program (static memo cells, the global keep scope, the external
//! bindings and the worker pool) through [`Runtime`].

pub mod concurrent;
pub mod error;
pub mod eval;
pub mod external;
pub mod link;
pub mod resolve;
pub mod runtime;

pub use eval::Evaluator;
pub use link::{link, ExternalBinding, LinkReport};
pub use resolve::{Lookup, Resolved};
pub use runtime::Runtime;
