/// Keeping a user's image list and the blob store in step
///
/// - [`reconcile`]: decides which stored images an update drops and
///   deletes them, best effort
/// - [`locks`]: per-user async locks that serialize updates to one record
///   inside a process

pub mod locks;
pub mod reconcile;

pub use locks::UserLocks;
pub use reconcile::{keys_to_delete, FailedDeletion, ImageReconciler, Reconciliation};
