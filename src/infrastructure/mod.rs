pub mod cache;
pub mod polling;
pub mod remote;
