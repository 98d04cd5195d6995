//! # ProfileHub Client
//!
//! Typed HTTP client for the ProfileHub API plus the session state shared
//! between the parts of an application that talk to it.
//!
//! - [`session::SessionContext`]: who is signed in, observable through a
//!   watch channel
//! - [`client::ApiClient`]: one method per endpoint; a 401 from any of them
//!   moves the session to `Expired`
//!
//! ## Example
//!
//! ```no_run
//! use profilehub_client::{ApiClient, SessionContext};
//!
//! # async fn example() -> Result<(), profilehub_client::ClientError> {
//! let session = SessionContext::new();
//! let client = ApiClient::new("http://localhost:8080", session.clone());
//!
//! client.login("ada@example.com", "correct horse").await?;
//! assert!(session.is_authenticated());
//!
//! let page = client.list_users(Some(20), None).await?;
//! println!("{} users", page.total);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod session;
pub mod types;

pub use client::ApiClient;
pub use error::ClientError;
pub use session::{Session, SessionContext, SessionState};
