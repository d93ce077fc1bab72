//! SQLite-backed local persistence for `modelsync` models: one table per
//! model type, versioned migrations, queries and change observers.

mod config;
mod error;
mod migrate;
mod observer;
mod query;
mod source;
mod store;

#[cfg(test)]
mod testing;

pub use config::{JournalMode, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use migrate::SchemaStatus;
pub use observer::{Observer, ObserverRegistry, Subscription};
pub use query::Query;
pub use source::{LocalDataSource, ModelCursor, Page, SaveOutcome};
pub use store::Store;
