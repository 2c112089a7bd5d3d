//! Per-unit-of-work batching and caching for graph-shaped reads.
//!
//! [`run`] opens a [`Scope`] for one unit of work (typically one incoming request). Loaders
//! obtained from the scope collect the keys requested by independent call sites, fetch each batch
//! with a single [`BatchFunction`] call, and cache every value until the unit of work ends. The
//! scope's drain loop keeps firing batches, including those queued while processing earlier
//! results, until nothing is left to fetch.

mod batch;
mod batch_function;
mod cache;
mod config;
mod context;
mod deferred;
mod error;
mod loader;
mod run;
mod scope;
mod scope_worker;
mod stats;

pub use batch_function::{batch_fn, BatchFunction, FnBatch};
pub use config::ScopeConfig;
pub use deferred::Deferred;
pub use error::{LoadError, LoadResult};
pub use loader::Loader;
pub use run::{run, run_with};
pub use scope::Scope;
pub use stats::ScopeStats;
