//! Library half of the `tensorio` binary, exposed for integration tests.

pub mod commands;
pub mod config;
pub mod render;
