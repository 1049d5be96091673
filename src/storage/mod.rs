//! In-memory key-value store and snapshot hydration.

pub mod snapshot;
pub mod store;
pub mod value;

pub use snapshot::load as load_snapshot;
pub use store::{Lookup, Store};
pub use value::{Entry, StorageValue};

/// Key type for storage.
pub type Key = Vec<u8>;
