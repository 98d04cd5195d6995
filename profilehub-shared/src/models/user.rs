/// User model and database operations
///
/// A user owns a handful of profile attributes and an ordered list of image
/// keys. The keys are opaque references into the blob store; position 0 is
/// the primary image. The list is always read and overwritten as a whole.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email CITEXT NOT NULL UNIQUE,
///     password_hash TEXT NOT NULL,
///     gender TEXT NOT NULL DEFAULT '',
///     city TEXT NOT NULL DEFAULT '',
///     education TEXT[] NOT NULL DEFAULT '{}',
///     image_keys TEXT[] NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use profilehub_shared::models::user::{User, UpdateUser};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, id: Uuid) -> Result<(), sqlx::Error> {
/// let update = UpdateUser {
///     city: Some("Lisbon".to_string()),
///     ..Default::default()
/// };
///
/// if let Some(user) = User::update(&pool, id, update).await? {
///     println!("{} now lives in {}", user.email, user.city);
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Column list shared by every query returning a full row.
///
/// `email` is cast back to TEXT so it decodes into a plain `String`.
const USER_COLUMNS: &str = "id, email::TEXT AS email, password_hash, gender, city, \
    education, image_keys, created_at, updated_at, last_login_at";

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Normalized (trimmed, lower-cased) email address, unique across users
    pub email: String,

    /// Argon2id PHC string. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub gender: String,

    pub city: String,

    pub education: Vec<String>,

    /// Ordered blob-store keys, at most `MAX_IMAGES` long
    #[serde(rename = "images")]
    pub image_keys: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

/// A user together with signed read URLs for its images
///
/// `photos` holds one URL per key that could be presigned; keys whose
/// presign failed are left out, so the two lists may differ in length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,

    pub photos: Vec<String>,
}

/// Input for creating a user
///
/// `email` must already be normalized and `password_hash` must be a hash,
/// never the plaintext password.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub gender: String,
    pub city: String,
    pub education: Vec<String>,
    pub image_keys: Vec<String>,
}

/// Partial update. `None` leaves the column untouched.
///
/// `image_keys`, when present, replaces the whole list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub education: Option<Vec<String>>,
    pub image_keys: Option<Vec<String>>,
}

impl UpdateUser {
    /// True when no column would change.
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.gender.is_none()
            && self.city.is_none()
            && self.education.is_none()
            && self.image_keys.is_none()
    }
}

/// Trims surrounding whitespace and lower-cases an email address.
///
/// Every write and every lookup goes through this, so two inputs that differ
/// only in case or padding always address the same record.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Inserts a new user.
    ///
    /// # Errors
    ///
    /// Returns a database error with constraint `users_email_key` when the
    /// email is already taken.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, password_hash, gender, city, education, image_keys) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.gender)
            .bind(data.city)
            .bind(data.education)
            .bind(data.image_keys)
            .fetch_one(pool)
            .await
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email. The argument is normalized before the lookup.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1::citext");

        sqlx::query_as::<_, User>(&query)
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await
    }

    /// Applies a partial update and bumps `updated_at`.
    ///
    /// # Returns
    ///
    /// The updated row, or `None` when no user has this ID.
    ///
    /// # Errors
    ///
    /// Fails on connection errors or when the new email belongs to someone
    /// else.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        let mut push = |column: &str, query: &mut String| {
            bind_count += 1;
            query.push_str(&format!(", {} = ${}", column, bind_count));
        };

        if data.email.is_some() {
            push("email", &mut query);
        }
        if data.password_hash.is_some() {
            push("password_hash", &mut query);
        }
        if data.gender.is_some() {
            push("gender", &mut query);
        }
        if data.city.is_some() {
            push("city", &mut query);
        }
        if data.education.is_some() {
            push("education", &mut query);
        }
        if data.image_keys.is_some() {
            push("image_keys", &mut query);
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {USER_COLUMNS}"));

        let mut q = sqlx::query_as::<_, User>(&query).bind(id);

        if let Some(email) = data.email {
            q = q.bind(normalize_email(&email));
        }
        if let Some(password_hash) = data.password_hash {
            q = q.bind(password_hash);
        }
        if let Some(gender) = data.gender {
            q = q.bind(gender);
        }
        if let Some(city) = data.city {
            q = q.bind(city);
        }
        if let Some(education) = data.education {
            q = q.bind(education);
        }
        if let Some(image_keys) = data.image_keys {
            q = q.bind(image_keys);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a user. Returns false when nothing was deleted.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamps `last_login_at` after a successful login.
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users, newest first.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use profilehub_shared::models::user::User;
    /// # use sqlx::PgPool;
    /// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
    /// let first_page = User::list(&pool, 20, 0).await?;
    /// let second_page = User::list(&pool, 20, 20).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Total number of users
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}
