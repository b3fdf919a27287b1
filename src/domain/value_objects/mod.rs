pub mod query_key;
pub mod record_id;

pub use query_key::{QueryFilter, QueryKey};
pub use record_id::RecordId;
