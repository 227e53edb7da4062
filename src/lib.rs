//! Matches grain sale orders against purchase orders and allocates
//! quantities by minimum transport distance.
//!
//! The pipeline loads orders from an [`OperationsStore`], resolves a
//! driving distance for every same-grain pairing (cache first, then a
//! [`RoutingService`] lookup), computes freight/tax/profit per bag, runs a
//! greedy capacity-constrained allocation pass over the distance-sorted
//! candidates, and writes the final allocation set to a [`ResultsSink`].
//! Status, progress, log and statistics of the in-flight run are readable
//! at any time through [`RunState`] snapshots.
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use grain_provisioner::{
//!     JsonFileSink, JsonFileStore, MapboxClient, Provisioner, RunConfig,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = JsonFileStore::default_location()?;
//! let routing = MapboxClient::new("mapbox-access-token")?;
//! let sink = JsonFileSink::default_location()?;
//!
//! let mut grain_names = HashMap::new();
//! grain_names.insert("5e349bed".to_string(), "corn".to_string());
//!
//! let provisioner = Provisioner::new(store, routing, sink).with_config(RunConfig {
//!     grain_names,
//!     ..RunConfig::default()
//! });
//!
//! let report = provisioner.run().await?;
//! println!("{} allocations written", report.allocations);
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod infra;
pub mod runner;

pub use domain::{
    Allocation, BuyOrder, Combination, Coordinates, EconomicParams, GrainNames, LogEntry,
    LogLevel, RunSnapshot, RunState, RunStats, RunStatus, SellOrder, Site,
};
pub use infra::{
    JsonFileSink, JsonFileStore, MapboxClient, MemorySink, MemoryStore, OperationRecord,
    OperationsStore, ResultsSink, RoutingError, RoutingService, SinkError, StoreError,
};
pub use runner::{Provisioner, RunConfig, RunError, RunReport};

/// Install a formatted `tracing` subscriber for the process, so the run
/// log's mirror events land on stderr.
#[cfg(feature = "logging")]
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
