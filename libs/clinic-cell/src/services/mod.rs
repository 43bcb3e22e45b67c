pub mod catalog;
pub mod staffing;

pub use catalog::*;
pub use staffing::*;
