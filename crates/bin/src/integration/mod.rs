//! Glue between the CLI and the keystone crates.

pub(crate) mod cache_manager;
pub(crate) mod runner;
