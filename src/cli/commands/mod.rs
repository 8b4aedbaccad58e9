//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod dev;
pub mod entries;
pub mod index;
pub mod init;
