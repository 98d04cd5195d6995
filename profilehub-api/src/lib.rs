//! # ProfileHub API Server Library
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: configuration from environment variables
//! - `error`: error type and HTTP response mapping
//! - `middleware`: response-header middleware
//! - `routes`: route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
