//! Archive Backend
//!
//! Accepts storage requests for files, records them in a durable ledger and
//! drives one upload task per requested storage provider until every
//! provider has returned an access handle.
//!
//! # Modules
//!
//! - `queue`: the transactional file ledger and task queue
//! - `providers`: the provider contract, registry and built-in providers
//! - `worker`: upload workers that drain the queue
//! - `routes`: the HTTP surface

pub mod config;
pub mod db;
pub mod error;
pub mod providers;
pub mod queue;
pub mod routes;
pub mod state;
pub mod types;
pub mod worker;

pub use error::{AppError, QueueError};
pub use queue::{ClaimedTask, QueueStore};
pub use types::{StorageRequest, UploadStatus};
