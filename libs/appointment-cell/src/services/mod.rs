pub mod lifecycle;
pub mod orchestrator;

pub use lifecycle::*;
pub use orchestrator::*;
