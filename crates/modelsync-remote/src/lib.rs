//! Cache-then-reconcile synchronization of `modelsync` stores against a
//! remote JSON resource.
//!
//! Local reads answer immediately from the SQLite cache. Network requests
//! run on a tokio runtime, and their completions run one at a time on a
//! [`MainContext`] thread, which is also the only place response-driven
//! cache writes happen.

mod dispatch;
mod error;
mod http;
mod query;
mod server;
mod sync;

#[cfg(test)]
mod testing;

pub use dispatch::MainContext;
pub use error::{RemoteError, SyncError};
pub use http::{url_with_query, HttpServer, HttpServerConfig};
pub use query::RemoteQuery;
pub use server::{JsonResult, Server, ServerFuture};
pub use sync::{callback, Callback, RemoteSync};
