pub mod collection_client;
mod envelope;

pub use collection_client::RemoteCollectionClient;
