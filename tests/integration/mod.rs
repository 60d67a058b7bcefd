//! Integration tests over a real HTTP boundary

mod recovery_tests;
mod retry_tests;
mod streaming_tests;
