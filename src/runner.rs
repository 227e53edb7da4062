//! The provisioning pipeline: load orders, pair them, allocate by minimum
//! distance, persist the outcome. One run at a time; status, progress and
//! logs are readable throughout via the shared [`RunState`].

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::{
    allocate, sort_by_distance, AllocationTotals, BuyOrder, Combination, EconomicParams,
    GrainNames, RunSnapshot, RunState, SellOrder,
};
use crate::infra::resolver::{DistanceOutcome, DistanceResolver};
use crate::infra::routing::RoutingService;
use crate::infra::sink::{ResultsSink, SinkError};
use crate::infra::store::{split_operations, OperationsStore, StoreError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("a provisioning run is already in progress")]
    AlreadyRunning,
    #[error("run cancelled")]
    Cancelled,
    #[error("no usable operations in the store")]
    NoOperations,
    #[error("no combinations to allocate")]
    NoCombinations,
    #[error("allocation pass produced no rows")]
    NothingAllocated,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Tunables for a run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub economics: EconomicParams,
    /// Grain id to display name, used in allocation rows and summaries.
    pub grain_names: GrainNames,
    /// Reuse the persisted combination working set instead of regenerating.
    pub reuse_combinations: bool,
    /// Emit a progress log line every this many processed combinations.
    pub log_every: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            economics: EconomicParams::default(),
            grain_names: GrainNames::new(),
            reuse_combinations: false,
            log_every: 100,
        }
    }
}

/// Summary returned by a successful run.
#[derive(Clone, Copy, Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub combinations: usize,
    pub allocations: usize,
}

/// Owns the collaborators and drives the pipeline.
pub struct Provisioner<S, R, K> {
    store: S,
    routing: R,
    sink: K,
    config: RunConfig,
    state: Arc<RunState>,
}

impl<S, R, K> Provisioner<S, R, K>
where
    S: OperationsStore,
    R: RoutingService,
    K: ResultsSink,
{
    pub fn new(store: S, routing: R, sink: K) -> Self {
        Self {
            store,
            routing,
            sink,
            config: RunConfig::default(),
            state: Arc::new(RunState::new()),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared run state for external pollers.
    pub fn state(&self) -> Arc<RunState> {
        Arc::clone(&self.state)
    }

    /// Current status/progress/log/statistics snapshot.
    pub fn snapshot(&self) -> RunSnapshot {
        self.state.snapshot()
    }

    /// Ask the in-flight run to stop at the next checkpoint.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Execute the full pipeline. A second call while a run is in flight
    /// fails with [`RunError::AlreadyRunning`] instead of racing the first.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let Some(run_id) = self.state.try_begin() else {
            return Err(RunError::AlreadyRunning);
        };
        self.state.info("=== provisioning run started ===");

        match self.execute(run_id).await {
            Ok(report) => {
                self.state.info("=== provisioning run completed ===");
                self.state.complete();
                Ok(report)
            }
            Err(err) => {
                self.state.fail(&format!("run failed: {err}"));
                Err(err)
            }
        }
    }

    /// Run in the background; poll through [`Provisioner::state`].
    pub fn spawn(self: Arc<Self>) -> JoinHandle<Result<RunReport, RunError>>
    where
        S: 'static,
        R: 'static,
        K: 'static,
    {
        tokio::spawn(async move { self.run().await })
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunReport, RunError> {
        self.sink.prepare().await?;
        self.state.set_progress(5.0);
        self.state.info("results sink prepared");
        self.check_cancelled()?;

        let records = self.store.load_operations().await?;
        self.state
            .with_stats(|stats| stats.total_operations = records.len());
        self.state.info(format!("{} operations found", records.len()));

        let (sales, purchases) = split_operations(&records)?;
        self.state.with_stats(|stats| {
            stats.total_sales = sales.len();
            stats.total_purchases = purchases.len();
        });
        self.state.info(format!(
            "split into {} sales and {} purchases",
            sales.len(),
            purchases.len()
        ));
        if sales.is_empty() || purchases.is_empty() {
            return Err(RunError::NoOperations);
        }
        self.state.set_progress(10.0);
        self.check_cancelled()?;

        let mut combinations = if self.config.reuse_combinations {
            let combinations = self.store.load_combinations().await?;
            self.state.info(format!(
                "{} combinations loaded from the working set",
                combinations.len()
            ));
            combinations
        } else {
            self.generate(&sales, &purchases).await?
        };
        if combinations.is_empty() {
            return Err(RunError::NoCombinations);
        }
        self.state
            .with_stats(|stats| stats.total_combinations = combinations.len());
        self.state.set_progress(40.0);
        self.check_cancelled()?;

        sort_by_distance(&mut combinations);
        self.state
            .info("=== starting minimum-distance allocation ===");

        let total = combinations.len();
        let log_every = self.config.log_every.max(1);
        let state = &self.state;
        let outcome = allocate(&combinations, &self.config.grain_names, |idx| {
            state.set_progress(40.0 + (idx as f64 / total as f64) * 50.0);
            state.with_stats(|stats| stats.processed_combinations = idx);
            if idx % log_every == 0 {
                let distance = combinations[idx - 1].distance;
                state.info(format!("processing {idx}/{total} - dist={distance:.1}km"));
            }
        });
        if outcome.allocations.is_empty() {
            return Err(RunError::NothingAllocated);
        }

        self.state.with_stats(|stats| {
            stats.total_allocated = outcome.totals.total_allocated;
            stats.total_revenue = outcome.totals.total_revenue;
            stats.total_cost = outcome.totals.total_cost;
            stats.total_profit = outcome.totals.total_profit;
            stats.total_freight = outcome.totals.total_freight;
            stats.total_tax_balance = outcome.totals.total_tax_balance;
            stats.average_distance = outcome.totals.average_distance();
            stats.grain_totals = outcome.totals.grain_totals.clone();
        });
        self.state.info(format!(
            "allocation finished: {} rows generated",
            outcome.allocations.len()
        ));
        self.state.set_progress(90.0);
        self.check_cancelled()?;

        self.state.info(format!(
            "inserting {} rows into the results sink",
            outcome.allocations.len()
        ));
        self.sink.replace_allocations(&outcome.allocations).await?;
        self.state.set_progress(100.0);
        self.log_summary(&outcome.totals);

        Ok(RunReport {
            run_id,
            combinations: total,
            allocations: outcome.allocations.len(),
        })
    }

    /// Cross-match sales against purchases of the same grain, resolving a
    /// distance and per-bag economics for every valid pair, and persist the
    /// resulting working set.
    async fn generate(
        &self,
        sales: &[SellOrder],
        purchases: &[BuyOrder],
    ) -> Result<Vec<Combination>, RunError> {
        let mut resolver = DistanceResolver::preload(&self.store, &self.routing).await?;
        self.state.info(format!(
            "{} distances loaded into memory",
            resolver.cached_entries()
        ));

        let total_pairs = sales.len() * purchases.len();
        let mut combinations = Vec::new();
        let mut processed = 0usize;

        for sale in sales {
            self.check_cancelled()?;
            for purchase in purchases {
                processed += 1;
                self.state
                    .set_progress(10.0 + (processed as f64 / total_pairs as f64) * 30.0);

                if sale.grain != purchase.grain {
                    continue;
                }

                let resolved = resolver
                    .resolve(&purchase.origin.id, &sale.destination.id)
                    .await;
                if resolved.outcome == DistanceOutcome::Unavailable {
                    self.state.warning(format!(
                        "distance {} -> {} unavailable; using 0 km",
                        purchase.origin.id, sale.destination.id
                    ));
                }

                let buyer = sale.buyer.clone().unwrap_or_else(|| "unknown".to_string());
                self.state.with_stats(|stats| {
                    stats
                        .buyer_distances
                        .entry(buyer)
                        .or_default()
                        .record(resolved.km)
                });

                combinations.push(Combination::evaluate(
                    sale,
                    purchase,
                    resolved.km,
                    &self.config.economics,
                ));
            }
        }

        self.state
            .with_stats(|stats| stats.distances_calculated = resolver.computed());
        self.state
            .info(format!("{} combinations generated", combinations.len()));

        if combinations.is_empty() {
            self.state.warning("no combinations to insert");
        } else {
            let removed = self.store.replace_combinations(&combinations).await?;
            self.state.info(format!(
                "working set replaced: {removed} removed, {} inserted",
                combinations.len()
            ));
            self.log_buyer_distances();
        }

        Ok(combinations)
    }

    fn log_buyer_distances(&self) {
        let stats = self.state.snapshot().stats;
        if stats.buyer_distances.is_empty() {
            return;
        }
        self.state.info("=== average distance per buyer ===");
        let mut buyers: Vec<_> = stats.buyer_distances.iter().collect();
        buyers.sort_by(|a, b| a.0.cmp(b.0));
        for (buyer, distances) in buyers {
            self.state.info(format!(
                "  {buyer}: {:.2} km over {} routes",
                distances.average(),
                distances.routes
            ));
        }
    }

    fn log_summary(&self, totals: &AllocationTotals) {
        self.state.info("=== final summary ===");
        self.state.info(format!(
            "total bags allocated: {}",
            totals.total_allocated
        ));
        self.state
            .info(format!("total revenue: {:.2}", totals.total_revenue));
        self.state
            .info(format!("total cost: {:.2}", totals.total_cost));
        self.state
            .info(format!("total profit: {:.2}", totals.total_profit));
        self.state.info(format!(
            "average distance: {:.2} km",
            totals.average_distance()
        ));
        self.state.info("total bags per grain:");
        let mut grains: Vec<_> = totals.grain_totals.iter().collect();
        grains.sort_by(|a, b| a.0.cmp(b.0));
        for (grain, qty) in grains {
            self.state.info(format!("  {grain}: {qty} bags"));
        }
    }

    fn check_cancelled(&self) -> Result<(), RunError> {
        if self.state.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}
