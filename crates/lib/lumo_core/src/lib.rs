//! # lumo_core
//!
//! Core domain logic for the Lumo authentication service.

pub mod auth;
pub mod db;
pub mod events;
pub mod migrate;
pub mod models;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
