//! Operations store: source of orders and cached distances, plus the
//! combination working set used between pipeline stages.
//!
//! The store is an external collaborator; this module owns the contract
//! (`OperationsStore`), the raw record shapes it serves, the normalization
//! of those records into domain orders, and two backends: an in-memory
//! store for tests and embedding, and a JSON-file store.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BuyOrder, Combination, Coordinates, GrainId, LocationId, OrderId, SellOrder, Site};

const OPERATIONS_FILE: &str = "operations.json";
const DISTANCES_FILE: &str = "distances.json";
const ADDRESSES_FILE: &str = "addresses.json";
const COMBINATIONS_FILE: &str = "combinations.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("invalid operation record: {0}")]
    InvalidRecord(String),
}

/// Ordered (origin, destination) location pair.
pub type DistanceKey = (LocationId, LocationId);

/// In-memory distance cache, keyed by location pair, values in km.
pub type DistanceMap = HashMap<DistanceKey, f64>;

/// Read/write contract the pipeline needs from the operations store.
#[async_trait]
pub trait OperationsStore: Send + Sync {
    /// All raw provisioning operations (destination order + origin orders).
    async fn load_operations(&self) -> Result<Vec<OperationRecord>, StoreError>;

    /// The persisted distance cache.
    async fn load_distances(&self) -> Result<DistanceMap, StoreError>;

    /// Persist one resolved distance so future runs reuse it.
    async fn upsert_distance(
        &self,
        from: &LocationId,
        to: &LocationId,
        in_km: f64,
    ) -> Result<(), StoreError>;

    /// Registered coordinates of a farm/delivery address, if any.
    async fn farm_coordinates(&self, location: &LocationId)
        -> Result<Option<Coordinates>, StoreError>;

    /// Clear the combination working set and bulk-insert a new one.
    /// Returns the number of rows removed.
    async fn replace_combinations(&self, combinations: &[Combination])
        -> Result<usize, StoreError>;

    /// The current combination working set.
    async fn load_combinations(&self) -> Result<Vec<Combination>, StoreError>;
}

// ---------------------------------------------------------------------------
// Raw record shapes and normalization
// ---------------------------------------------------------------------------

/// A pickup or delivery address as the store serves it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: LocationId,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// Destination side of an operation: the sale commitment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub id: OrderId,
    pub grain: GrainId,
    pub bag_price: f64,
    pub amount: f64,
    /// Provisioned amount at capture time; absent on older records.
    #[serde(default)]
    pub amount_provisioned: Option<f64>,
    #[serde(default)]
    pub has_pis: bool,
    #[serde(default)]
    pub buyer: Option<String>,
    pub to: SiteRecord,
}

/// Origin side of an operation: one purchase commitment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginRecord {
    pub id: OrderId,
    pub grain: GrainId,
    pub bag_price: f64,
    pub amount: f64,
    #[serde(default)]
    pub has_pis: bool,
    #[serde(default)]
    pub seller: Option<String>,
    pub from: SiteRecord,
}

/// One raw provisioning operation as stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub destination_order: DestinationRecord,
    #[serde(default)]
    pub origin_orders: Vec<OriginRecord>,
}

/// Normalize raw operations into flat sell/buy order lists.
///
/// The destination's original provisioned amount defaults to the live
/// amount when the record carries no distinct value; the result is the
/// immutable allocation ceiling for the rest of the run. Records with
/// non-finite or negative prices/amounts are rejected outright rather than
/// letting them reach the financial math.
pub fn split_operations(
    records: &[OperationRecord],
) -> Result<(Vec<SellOrder>, Vec<BuyOrder>), StoreError> {
    let mut sales = Vec::with_capacity(records.len());
    let mut purchases = Vec::new();

    for record in records {
        let dest = &record.destination_order;
        check_amounts(&dest.id, dest.bag_price, dest.amount)?;

        sales.push(SellOrder {
            id: dest.id.clone(),
            grain: dest.grain.clone(),
            bag_price: dest.bag_price,
            amount: dest.amount,
            amount_provisioned_original: dest.amount_provisioned.unwrap_or(dest.amount),
            buyer: dest.buyer.clone(),
            destination: Site {
                id: dest.to.id.clone(),
                coords: dest.to.coordinates,
            },
            has_pis: dest.has_pis,
        });

        for origin in &record.origin_orders {
            check_amounts(&origin.id, origin.bag_price, origin.amount)?;
            purchases.push(BuyOrder {
                id: origin.id.clone(),
                grain: origin.grain.clone(),
                bag_price: origin.bag_price,
                amount: origin.amount,
                seller: origin.seller.clone(),
                origin: Site {
                    id: origin.from.id.clone(),
                    coords: origin.from.coordinates,
                },
                has_pis: origin.has_pis,
            });
        }
    }

    Ok((sales, purchases))
}

fn check_amounts(id: &OrderId, bag_price: f64, amount: f64) -> Result<(), StoreError> {
    if !bag_price.is_finite() || bag_price < 0.0 {
        return Err(StoreError::InvalidRecord(format!(
            "order {id}: bag price {bag_price} is not usable"
        )));
    }
    if !amount.is_finite() || amount < 0.0 {
        return Err(StoreError::InvalidRecord(format!(
            "order {id}: amount {amount} is not usable"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Store backend holding everything in memory. Used by tests and by hosts
/// that load records through other means.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    operations: Vec<OperationRecord>,
    distances: DistanceMap,
    addresses: HashMap<LocationId, Coordinates>,
    combinations: Vec<Combination>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_operation(&self, record: OperationRecord) {
        self.inner.write().operations.push(record);
    }

    pub fn set_distance(&self, from: &str, to: &str, in_km: f64) {
        self.inner
            .write()
            .distances
            .insert((from.to_string(), to.to_string()), in_km);
    }

    pub fn set_address(&self, location: &str, coords: Coordinates) {
        self.inner
            .write()
            .addresses
            .insert(location.to_string(), coords);
    }

    /// Copy of the current working set, for assertions and inspection.
    pub fn combinations(&self) -> Vec<Combination> {
        self.inner.read().combinations.clone()
    }

    /// Copy of the persisted distances, for assertions and inspection.
    pub fn distances(&self) -> DistanceMap {
        self.inner.read().distances.clone()
    }
}

#[async_trait]
impl OperationsStore for MemoryStore {
    async fn load_operations(&self) -> Result<Vec<OperationRecord>, StoreError> {
        Ok(self.inner.read().operations.clone())
    }

    async fn load_distances(&self) -> Result<DistanceMap, StoreError> {
        Ok(self.inner.read().distances.clone())
    }

    async fn upsert_distance(
        &self,
        from: &LocationId,
        to: &LocationId,
        in_km: f64,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .distances
            .insert((from.clone(), to.clone()), in_km);
        Ok(())
    }

    async fn farm_coordinates(
        &self,
        location: &LocationId,
    ) -> Result<Option<Coordinates>, StoreError> {
        Ok(self.inner.read().addresses.get(location).copied())
    }

    async fn replace_combinations(
        &self,
        combinations: &[Combination],
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let removed = inner.combinations.len();
        inner.combinations = combinations.to_vec();
        Ok(removed)
    }

    async fn load_combinations(&self) -> Result<Vec<Combination>, StoreError> {
        Ok(self.inner.read().combinations.clone())
    }
}

// ---------------------------------------------------------------------------
// JSON-file store
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DistanceRecord {
    from: LocationId,
    to: LocationId,
    in_km: f64,
}

/// Store backend reading and writing JSON files under a base directory.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    base: PathBuf,
}

impl JsonFileStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Store rooted in the platform data directory.
    pub fn default_location() -> Result<Self, StoreError> {
        let dirs = ProjectDirs::from("com", "GrainProvisioner", "GrainProvisioner")
            .ok_or(StoreError::StorageUnavailable)?;
        Ok(Self::new(dirs.data_dir()))
    }

    /// Seed or refresh the raw operations file.
    pub fn save_operations(&self, records: &[OperationRecord]) -> Result<(), StoreError> {
        self.write_json(OPERATIONS_FILE, records)
    }

    /// Seed or refresh the address registry file.
    pub fn save_addresses(
        &self,
        addresses: &HashMap<LocationId, Coordinates>,
    ) -> Result<(), StoreError> {
        self.write_json(ADDRESSES_FILE, addresses)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.base.join(file)
    }

    fn read_json<T: serde::de::DeserializeOwned + Default>(
        &self,
        file: &str,
    ) -> Result<T, StoreError> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base)?;
        let json = serde_json::to_string_pretty(value)?;
        fs::write(self.path(file), json)?;
        Ok(())
    }
}

#[async_trait]
impl OperationsStore for JsonFileStore {
    async fn load_operations(&self) -> Result<Vec<OperationRecord>, StoreError> {
        self.read_json(OPERATIONS_FILE)
    }

    async fn load_distances(&self) -> Result<DistanceMap, StoreError> {
        let records: Vec<DistanceRecord> = self.read_json(DISTANCES_FILE)?;
        Ok(records
            .into_iter()
            .map(|r| ((r.from, r.to), r.in_km))
            .collect())
    }

    async fn upsert_distance(
        &self,
        from: &LocationId,
        to: &LocationId,
        in_km: f64,
    ) -> Result<(), StoreError> {
        let mut records: Vec<DistanceRecord> = self.read_json(DISTANCES_FILE)?;
        match records
            .iter_mut()
            .find(|r| &r.from == from && &r.to == to)
        {
            Some(existing) => existing.in_km = in_km,
            None => records.push(DistanceRecord {
                from: from.clone(),
                to: to.clone(),
                in_km,
            }),
        }
        self.write_json(DISTANCES_FILE, &records)
    }

    async fn farm_coordinates(
        &self,
        location: &LocationId,
    ) -> Result<Option<Coordinates>, StoreError> {
        let addresses: HashMap<LocationId, Coordinates> = self.read_json(ADDRESSES_FILE)?;
        Ok(addresses.get(location).copied())
    }

    async fn replace_combinations(
        &self,
        combinations: &[Combination],
    ) -> Result<usize, StoreError> {
        let previous: Vec<Combination> = self.read_json(COMBINATIONS_FILE)?;
        self.write_json(COMBINATIONS_FILE, &combinations)?;
        Ok(previous.len())
    }

    async fn load_combinations(&self) -> Result<Vec<Combination>, StoreError> {
        self.read_json(COMBINATIONS_FILE)
    }
}
