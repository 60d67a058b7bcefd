//! Error taxonomy and provider error mapping

pub mod mapper;
pub mod types;

pub use mapper::{ErrorMapper, ErrorMapping, NormalizedError, RawError};
pub use types::{AiError, ErrorKind, Result, Severity};
