#![forbid(unsafe_code)]
//! costflow-query: the boundary to the analytical query engine.
//!
//! Steps never build query text by hand. They describe work as typed
//! [`Statement`]s whose values pass through the [`literal`] encoder when
//! rendered, and hand them to a [`QueryEngine`]. [`MemoryEngine`] interprets
//! statements directly and stands in for a real engine in tests.

pub mod engine;
pub mod error;
pub mod filter;
pub mod literal;
pub mod memory;
pub mod statement;
pub mod view;

pub use engine::QueryEngine;
pub use error::{QueryError, Result};
pub use filter::Predicate;
pub use memory::MemoryEngine;
pub use statement::Statement;
pub use view::MaterializedView;
