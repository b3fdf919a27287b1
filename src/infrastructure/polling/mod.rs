pub mod adaptive_poller;

pub use adaptive_poller::{PollHandle, spawn_poller};
