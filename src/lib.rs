//! Consumer-level energy attribution for shared self-consumption (ZEV) billing groups.

pub mod analysis;
pub mod api;
/// Day-granular range cache and the cache-backed data source.
pub mod cache;
pub mod config;
pub mod io;
pub mod ranges;
pub mod report;
pub mod setup;
pub mod source;
