//! # Mosaic Core Kernel
//!
//! Process-level pieces shared by every other module:
//!
//! - **Constants**: API version and module entry symbol names (`constants`
//!   submodule).
//! - **Error Handling**: the aggregate [`Error`](error::Error) type and the
//!   `Result` alias used by front ends such as the `mosaic` CLI.
pub mod constants;
pub mod error;

pub use error::{Error, Result};
