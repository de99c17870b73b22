//! Backend abstraction layer
//!
//! Provides the traits a graphics API implements to drive the render graph,
//! the abstract resource state model, and a recording dummy backend.

pub mod dummy;
pub mod state;
pub mod traits;
pub mod types;

pub use dummy::{DummyBackend, DummyCommandList, DummyResource, RecordedCommand};
pub use state::*;
pub use traits::*;
pub use types::*;
