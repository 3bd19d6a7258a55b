//! # UserStore Shared Library
//!
//! This crate provides CRUD access to user records kept in ClickHouse: lookup
//! by id or alias, append-only updates, schema introspection, and per-property
//! write times used to decide which of two users holds the fresher value when
//! they are merged.
//!
//! ## Module Organization
//!
//! - `config`: ClickHouse connection configuration
//! - `db`: Storage client contract, ClickHouse HTTP client, schema bootstrap
//! - `models`: User records, patches and property-time types
//! - `store`: The `UserStore` component
//! - `error`: Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::UserStore;

/// Current version of the UserStore shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
