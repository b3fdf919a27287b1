pub mod credential_provider;
pub mod remote_collection;
pub mod transport;
