//! Pipeline entry points for monitor operations.
//!
//! - `ProductCache`: per-store snapshot diffing
//! - `StoreMonitor`: the per-store polling loop
//! - `run_monitors`: launch every monitor and manage shutdown

pub mod cache;
pub mod monitor;
pub mod run;

pub use cache::ProductCache;
pub use monitor::{StopHandle, StoreMonitor};
pub use run::run_monitors;
