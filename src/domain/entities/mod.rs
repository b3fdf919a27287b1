pub mod admin_user;
pub mod meal_request;
pub mod pending_transaction;
pub mod role;
pub mod scheduled_job;
pub mod snapshot;

pub use admin_user::{AdminUser, AdminUserChanges};
pub use meal_request::{MealRequest, MealRequestChanges, MealRequestStatus};
pub use pending_transaction::{PendingEffect, PendingEntry, PendingTransaction, TransactionId};
pub use role::{Role, RoleChanges};
pub use scheduled_job::{JobRunState, ScheduledJob, ScheduledJobChanges};
pub use snapshot::Snapshot;
