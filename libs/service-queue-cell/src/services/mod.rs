pub mod engine;
pub mod dispatcher;
pub mod monitor;
pub mod events;
pub mod priority;

pub use engine::*;
pub use dispatcher::*;
pub use monitor::*;
pub use events::*;
pub use priority::*;
