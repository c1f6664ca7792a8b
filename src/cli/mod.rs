//! CLI command handlers

pub mod commands;

pub use commands::{clear, process, register, show, status, RegisterArgs};
