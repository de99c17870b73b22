//! Render Graph System
//!
//! Passes declare which resources they create, read and write. The graph
//! orders them into dependency levels, allocates transient resources for
//! exactly the levels that use them, and plans the state transitions needed
//! between levels.

pub mod builder;
mod executor;
pub mod error;
pub mod graph;
pub mod level;
pub mod pass;
pub mod resolver;
pub mod resource;
pub mod storage;

pub use builder::{CompiledGraph, GraphBuilder};
pub use error::*;
pub use graph::*;
pub use level::*;
pub use pass::*;
pub use resolver::*;
pub use resource::*;
pub use storage::*;
