/// Middleware for the API server
///
/// - `security`: hardening headers on every response

pub mod security;
