//! # ProfileHub Shared Library
//!
//! Types and logic shared by the ProfileHub API server and its client.
//!
//! ## Module Organization
//!
//! - `models`: database rows and their queries
//! - `db`: connection pool and migrations
//! - `auth`: password hashing, JWTs, bearer-token extraction
//! - `storage`: the blob store trait, its backends and signed URLs
//! - `images`: image reconciliation and per-user update locks

pub mod auth;
pub mod db;
pub mod images;
pub mod models;
pub mod storage;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of images a profile may reference
pub const MAX_IMAGES: usize = 4;
