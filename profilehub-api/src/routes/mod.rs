/// API route handlers
///
/// - `health`: liveness and database check
/// - `users`: registration, login, token refresh and profile CRUD
/// - `uploads`: multipart image upload
/// - `blobs`: serves image bytes behind signed URLs

pub mod blobs;
pub mod health;
pub mod uploads;
pub mod users;
