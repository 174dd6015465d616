//! Runtime-agnostic command execution library
//!
//! This crate provides a unified interface for invoking external tools and
//! capturing their exit status and combined output. Callers build a
//! [`Command`], hand it to a [`Runner`], and get back a [`CommandOutput`];
//! nothing here interprets the tool's semantics beyond its exit status.

pub mod command;
pub mod error;
pub mod local;
pub mod output;
pub mod runner;

pub use command::Command;
pub use error::{Error, Result};
pub use local::LocalRunner;
pub use output::{CommandOutput, ExitStatus};
pub use runner::Runner;
