//! Distance resolution: in-memory cache first, routing service on miss.

use std::collections::HashSet;

use crate::domain::LocationId;
use crate::infra::routing::RoutingService;
use crate::infra::store::{DistanceKey, DistanceMap, OperationsStore, StoreError};

/// How a distance was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceOutcome {
    /// Served from the pre-loaded cache or an earlier lookup this run.
    Cached,
    /// Computed through the routing service and persisted.
    Computed,
    /// Coordinates missing or routing failed; 0 km substituted.
    Unavailable,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedDistance {
    pub km: f64,
    pub outcome: DistanceOutcome,
}

/// Resolves distances for (origin, destination) location pairs.
///
/// The in-memory map is consulted before any network call, so each pair
/// costs at most one routing request per run. Positive cached values are
/// authoritative; a cached zero is re-attempted once per run because the
/// persisted cache cannot tell a genuine zero-length route from a value
/// written by an older, failed lookup.
///
/// Failures are degraded results, not errors: the pair resolves to 0 km,
/// nothing is persisted, and the run continues.
pub struct DistanceResolver<'a, S, R> {
    store: &'a S,
    routing: &'a R,
    map: DistanceMap,
    attempted: HashSet<DistanceKey>,
    computed: usize,
}

impl<'a, S, R> DistanceResolver<'a, S, R>
where
    S: OperationsStore,
    R: RoutingService,
{
    /// Pre-load the persisted distance cache into memory.
    pub async fn preload(store: &'a S, routing: &'a R) -> Result<Self, StoreError> {
        let map = store.load_distances().await?;
        Ok(Self {
            store,
            routing,
            map,
            attempted: HashSet::new(),
            computed: 0,
        })
    }

    /// Number of entries loaded from the persisted cache plus those
    /// resolved so far this run.
    pub fn cached_entries(&self) -> usize {
        self.map.len()
    }

    /// Number of distances computed through the routing service this run.
    pub fn computed(&self) -> usize {
        self.computed
    }

    pub async fn resolve(&mut self, from: &LocationId, to: &LocationId) -> ResolvedDistance {
        let key = (from.clone(), to.clone());

        match self.map.get(&key) {
            Some(&km) if km > 0.0 => {
                return ResolvedDistance {
                    km,
                    outcome: DistanceOutcome::Cached,
                }
            }
            Some(&km) if self.attempted.contains(&key) => {
                return ResolvedDistance {
                    km,
                    outcome: DistanceOutcome::Cached,
                }
            }
            _ => {}
        }

        self.attempted.insert(key.clone());
        match self.lookup(from, to).await {
            Some(km) => {
                self.map.insert(key, km);
                self.computed += 1;
                if let Err(err) = self.store.upsert_distance(from, to, km).await {
                    tracing::warn!("failed to persist distance {from} -> {to}: {err}");
                }
                ResolvedDistance {
                    km,
                    outcome: DistanceOutcome::Computed,
                }
            }
            None => {
                self.map.insert(key, 0.0);
                ResolvedDistance {
                    km: 0.0,
                    outcome: DistanceOutcome::Unavailable,
                }
            }
        }
    }

    async fn lookup(&self, from: &LocationId, to: &LocationId) -> Option<f64> {
        let from_coords = match self.store.farm_coordinates(from).await {
            Ok(Some(coords)) => coords,
            Ok(None) => {
                tracing::warn!("no coordinates registered for {from}");
                return None;
            }
            Err(err) => {
                tracing::warn!("coordinate lookup failed for {from}: {err}");
                return None;
            }
        };
        let to_coords = match self.store.farm_coordinates(to).await {
            Ok(Some(coords)) => coords,
            Ok(None) => {
                tracing::warn!("no coordinates registered for {to}");
                return None;
            }
            Err(err) => {
                tracing::warn!("coordinate lookup failed for {to}: {err}");
                return None;
            }
        };

        match self.routing.driving_distance(from_coords, to_coords).await {
            Ok(km) => Some(km),
            Err(err) => {
                tracing::warn!("routing lookup {from} -> {to} failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::Coordinates;
    use crate::infra::routing::RoutingError;
    use crate::infra::store::MemoryStore;

    struct FixedRouting {
        km: f64,
        calls: AtomicUsize,
    }

    impl FixedRouting {
        fn new(km: f64) -> Self {
            Self {
                km,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoutingService for FixedRouting {
        async fn driving_distance(
            &self,
            _from: Coordinates,
            _to: Coordinates,
        ) -> Result<f64, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.km)
        }
    }

    struct FailingRouting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RoutingService for FailingRouting {
        async fn driving_distance(
            &self,
            _from: Coordinates,
            _to: Coordinates,
        ) -> Result<f64, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RoutingError::Api("unavailable".to_string()))
        }
    }

    fn coords() -> Coordinates {
        Coordinates {
            lon: -47.9,
            lat: -15.8,
        }
    }

    #[tokio::test]
    async fn cache_hit_makes_no_routing_call() {
        let store = MemoryStore::new();
        store.set_distance("a", "b", 55.0);
        let routing = FixedRouting::new(99.0);

        let mut resolver = DistanceResolver::preload(&store, &routing).await.unwrap();
        let resolved = resolver.resolve(&"a".to_string(), &"b".to_string()).await;

        assert_eq!(resolved.km, 55.0);
        assert_eq!(resolved.outcome, DistanceOutcome::Cached);
        assert_eq!(routing.calls(), 0);
    }

    #[tokio::test]
    async fn miss_computes_once_and_persists() {
        let store = MemoryStore::new();
        store.set_address("a", coords());
        store.set_address("b", coords());
        let routing = FixedRouting::new(120.0);

        let mut resolver = DistanceResolver::preload(&store, &routing).await.unwrap();
        let first = resolver.resolve(&"a".to_string(), &"b".to_string()).await;
        let second = resolver.resolve(&"a".to_string(), &"b".to_string()).await;

        assert_eq!(first.outcome, DistanceOutcome::Computed);
        assert_eq!(second.outcome, DistanceOutcome::Cached);
        assert_eq!(first.km, 120.0);
        assert_eq!(second.km, 120.0);
        assert_eq!(routing.calls(), 1);
        assert_eq!(resolver.computed(), 1);
        assert_eq!(
            store
                .distances()
                .get(&("a".to_string(), "b".to_string())),
            Some(&120.0)
        );
    }

    #[tokio::test]
    async fn missing_coordinates_degrade_to_zero_without_calls() {
        let store = MemoryStore::new();
        let routing = FixedRouting::new(120.0);

        let mut resolver = DistanceResolver::preload(&store, &routing).await.unwrap();
        let resolved = resolver.resolve(&"a".to_string(), &"b".to_string()).await;

        assert_eq!(resolved.km, 0.0);
        assert_eq!(resolved.outcome, DistanceOutcome::Unavailable);
        assert_eq!(routing.calls(), 0);
        assert!(store.distances().is_empty());
    }

    #[tokio::test]
    async fn routing_failure_is_attempted_once_per_run() {
        let store = MemoryStore::new();
        store.set_address("a", coords());
        store.set_address("b", coords());
        let routing = FailingRouting {
            calls: AtomicUsize::new(0),
        };

        let mut resolver = DistanceResolver::preload(&store, &routing).await.unwrap();
        let first = resolver.resolve(&"a".to_string(), &"b".to_string()).await;
        let second = resolver.resolve(&"a".to_string(), &"b".to_string()).await;

        assert_eq!(first.outcome, DistanceOutcome::Unavailable);
        assert_eq!(second.km, 0.0);
        assert_eq!(routing.calls.load(Ordering::SeqCst), 1);
        // Degraded results are never written back to the store.
        assert!(store.distances().is_empty());
        assert_eq!(resolver.computed(), 0);
    }

    #[tokio::test]
    async fn persisted_zero_is_retried_once() {
        let store = MemoryStore::new();
        store.set_distance("a", "b", 0.0);
        store.set_address("a", coords());
        store.set_address("b", coords());
        let routing = FixedRouting::new(80.0);

        let mut resolver = DistanceResolver::preload(&store, &routing).await.unwrap();
        let resolved = resolver.resolve(&"a".to_string(), &"b".to_string()).await;

        assert_eq!(resolved.km, 80.0);
        assert_eq!(resolved.outcome, DistanceOutcome::Computed);
        assert_eq!(routing.calls(), 1);
    }
}
