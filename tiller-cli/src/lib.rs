//! tiller CLI - Command-line interface for the tiller migration executor.
//!
//! This crate provides the `tiller` tool for inspecting context types,
//! scaffolding migrations, generating SQL scripts and updating databases.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
