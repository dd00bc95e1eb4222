//! Tool plane: the [`tool::Tool`] trait, the name-unique registry, the
//! dual-view result discipline with offloading, and category-based
//! selection/deferral.

pub mod builtin;
pub mod registry;
pub mod result;
pub mod select;
pub mod store;
pub mod tool;

pub use registry::ToolRegistry;
pub use select::{ToolSelector, Selection};
pub use store::ResultStore;
pub use tool::Tool;
