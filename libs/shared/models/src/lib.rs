pub mod document;
pub mod error;
pub mod staff;

pub use document::AttributeDocument;
pub use error::{AppError, FlowError};
pub use staff::{StaffMember, StaffRole};
