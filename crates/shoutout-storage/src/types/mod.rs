//! Type definitions for shoutout storage.

mod ids;
mod organizations;
mod slots;
mod status;
mod submissions;
mod workflow;

// Re-export all types from submodules
pub use ids::*;
pub use organizations::*;
pub use slots::*;
pub use status::*;
pub use submissions::*;
pub use workflow::*;
