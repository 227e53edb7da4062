//! Core order, pairing and allocation types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifier of an order in the operations store.
pub type OrderId = String;

/// Identifier of a grain kind (e.g. corn, sorghum).
pub type GrainId = String;

/// Identifier of a farm or delivery address.
pub type LocationId = String;

/// WGS84 point, stored longitude-first as the routing API expects it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

/// A pickup or delivery site: address id plus coordinates when known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: LocationId,
    pub coords: Option<Coordinates>,
}

/// Destination-side demand: a buyer committed to receive grain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SellOrder {
    pub id: OrderId,
    pub grain: GrainId,
    pub bag_price: f64,
    pub amount: f64,
    /// Hard allocation ceiling for this order. Captured once at load time;
    /// later edits to `amount` never raise it.
    pub amount_provisioned_original: f64,
    pub buyer: Option<String>,
    pub destination: Site,
    pub has_pis: bool,
}

/// Origin-side supply: a seller committed to ship grain from a farm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub id: OrderId,
    pub grain: GrainId,
    pub bag_price: f64,
    pub amount: f64,
    pub seller: Option<String>,
    pub origin: Site,
    pub has_pis: bool,
}

/// A candidate pairing of one sell order with one buy order of the same
/// grain, with its distance and per-bag economics. Immutable once built;
/// remaining-capacity bookkeeping lives in the allocation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    pub destination_order: OrderId,
    pub origin_order: OrderId,
    pub buyer: Option<String>,
    pub seller: Option<String>,
    pub grain: GrainId,
    pub destination_price: f64,
    pub origin_price: f64,
    pub amount_destination: f64,
    pub amount_origin: f64,
    pub freight_cost: f64,
    pub origin_credit: f64,
    pub destination_tax: f64,
    pub effective_origin_cost: f64,
    /// Per-bag profit. May be negative; unprofitable pairs are kept.
    pub profit: f64,
    pub distance: f64,
    pub from_coords: Option<Coordinates>,
    pub to_coords: Option<Coordinates>,
    pub amount_provisioned_original: f64,
    /// Pre-allocation estimate: min(destination cap, origin amount).
    pub amount_allocated_original: f64,
}

/// A realized allocation row, as persisted to the results sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub destination_order: OrderId,
    pub origin_order: OrderId,
    pub buyer: Option<String>,
    pub seller: Option<String>,
    /// Display name of the grain (mapped through [`RunConfig::grain_names`],
    /// falling back to the raw id).
    ///
    /// [`RunConfig::grain_names`]: crate::runner::RunConfig::grain_names
    pub grain: String,
    pub amount_allocated: f64,
    pub revenue: f64,
    pub cost: f64,
    pub freight: f64,
    pub tax_balance: f64,
    pub profit_total: f64,
    pub distance: f64,
    pub from_coords: Option<Coordinates>,
    pub to_coords: Option<Coordinates>,
}

/// Freight and tax parameters for per-bag economics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomicParams {
    /// Freight cost per bag per kilometer.
    pub freight_per_km: f64,
    /// Minimum freight per bag; short hauls still pay this floor.
    pub freight_minimum: f64,
    /// PIS/COFINS rate applied to the bag price when the order is flagged.
    pub pis_cofins_rate: f64,
}

impl Default for EconomicParams {
    fn default() -> Self {
        Self {
            freight_per_km: 0.024,
            freight_minimum: 1.50,
            pis_cofins_rate: 0.0925,
        }
    }
}

impl EconomicParams {
    /// Freight per bag for a haul of `distance_km`, respecting the floor.
    pub fn freight(&self, distance_km: f64) -> f64 {
        (distance_km * self.freight_per_km).max(self.freight_minimum)
    }

    /// PIS/COFINS amount on `bag_price`, zero when the order is not flagged.
    pub fn pis_tax(&self, bag_price: f64, has_pis: bool) -> f64 {
        if has_pis {
            bag_price * self.pis_cofins_rate
        } else {
            0.0
        }
    }
}

/// Maps grain ids to display names for reporting.
pub type GrainNames = HashMap<GrainId, String>;

/// Resolve a grain's display name, falling back to the raw id.
pub fn grain_display_name(names: &GrainNames, grain: &GrainId) -> String {
    names.get(grain).cloned().unwrap_or_else(|| grain.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freight_floor_applies_to_short_hauls() {
        let params = EconomicParams::default();
        // 10 km * 0.024 = 0.24, below the 1.50 floor
        assert_eq!(params.freight(10.0), 1.50);
        // 100 km * 0.024 = 2.40, above the floor
        assert!((params.freight(100.0) - 2.40).abs() < 1e-9);
    }

    #[test]
    fn pis_tax_respects_flag() {
        let params = EconomicParams::default();
        assert_eq!(params.pis_tax(100.0, false), 0.0);
        assert!((params.pis_tax(100.0, true) - 9.25).abs() < 1e-9);
    }

    #[test]
    fn grain_name_falls_back_to_id() {
        let mut names = GrainNames::new();
        names.insert("g-corn".to_string(), "corn".to_string());
        assert_eq!(grain_display_name(&names, &"g-corn".to_string()), "corn");
        assert_eq!(
            grain_display_name(&names, &"g-other".to_string()),
            "g-other"
        );
    }
}
