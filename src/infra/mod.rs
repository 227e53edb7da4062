//! External collaborators: operations store, routing service, results sink.

pub mod resolver;
pub mod routing;
pub mod sink;
pub mod store;

pub use resolver::{DistanceOutcome, DistanceResolver, ResolvedDistance};
pub use routing::{MapboxClient, RoutingError, RoutingService};
pub use sink::{JsonFileSink, MemorySink, ResultsSink, SinkError};
pub use store::{
    split_operations, DestinationRecord, DistanceKey, DistanceMap, JsonFileStore, MemoryStore,
    OperationRecord, OperationsStore, OriginRecord, SiteRecord, StoreError,
};
