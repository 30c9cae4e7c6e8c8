#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for reposnap
//!
//! This library consolidates all functionality for the reposnap tool, which lets users
//! browse public repositories and download them as a single zip archive.
//!
//! # Module Organization
//!
//! - [`commands`]: Command-line interface and configuration
//! - [`snapshot`]: Tree listing, bounded concurrent fetching, and archive construction
//! - [`server`]: HTTP surface exposing the snapshot engine

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

pub mod server;
pub mod snapshot;

pub use crate::commands::{Config, Host, run};
