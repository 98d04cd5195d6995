/// Database models for ProfileHub
///
/// # Models
///
/// - `user`: user accounts, profile attributes and the ordered list of
///   image keys that reference objects in the blob store
///
/// # Example
///
/// ```no_run
/// use profilehub_shared::models::user::{normalize_email, CreateUser, User};
/// use profilehub_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: normalize_email(" Ada@Example.com "),
///     password_hash: "$argon2id$...".to_string(),
///     ..Default::default()
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```

pub mod user;
