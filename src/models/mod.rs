pub mod result;
pub mod status;

pub use result::{FileCoverage, PendingAssertionFailure};
pub use status::{RunStatus, TestVerdict};
