//! Use-case services over the stages.
//!
//! # Responsibility
//! - Sequence stages into a full run for the CLI.
//! - Keep the CLI decoupled from SQL and file handling.

pub mod pipeline;
