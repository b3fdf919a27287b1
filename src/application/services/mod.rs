pub mod credential_coordinator;
pub mod mutation_controller;
pub mod poll_scheduler;
pub mod query_sync;
pub mod transaction_ledger;

pub use credential_coordinator::CredentialRefreshCoordinator;
pub use mutation_controller::{MutationOutcome, OptimisticMutationController, RecordOutcome};
pub use poll_scheduler::{InteractionLock, PollPolicy, poll_interval};
pub use query_sync::QuerySync;
pub use transaction_ledger::{SharedLedger, TransactionLedger};
