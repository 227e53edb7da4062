//! Greedy capacity-constrained allocation over distance-sorted combinations.

use std::collections::HashMap;

use super::entities::{grain_display_name, Allocation, Combination, GrainNames, OrderId};

/// Running totals accumulated over one allocation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocationTotals {
    pub total_allocated: f64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub total_profit: f64,
    pub total_freight: f64,
    pub total_tax_balance: f64,
    pub distance_sum: f64,
    /// Number of combinations that received a non-zero allocation.
    pub routes: usize,
    pub grain_totals: HashMap<String, f64>,
}

impl AllocationTotals {
    pub fn average_distance(&self) -> f64 {
        if self.routes == 0 {
            0.0
        } else {
            self.distance_sum / self.routes as f64
        }
    }
}

/// Result of one allocation pass.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationOutcome {
    pub allocations: Vec<Allocation>,
    pub totals: AllocationTotals,
}

/// Sort combinations by ascending distance.
///
/// `sort_by` is stable, so pairs at equal distance keep their generation
/// order; the pass below depends on this for deterministic output.
pub fn sort_by_distance(combinations: &mut [Combination]) {
    combinations.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Run the greedy pass over combinations already sorted by distance.
///
/// Two running-capacity maps are kept: destination remaining (seeded from
/// the order's original provisioned amount) and origin remaining (seeded
/// from the available amount). Each combination takes
/// min(destination remaining, origin remaining), clipped so the
/// destination's cumulative allocation never exceeds its original cap.
/// Nearest pairs are serviced first even when a farther pair would profit
/// more; there is no backtracking once a capacity is spent.
///
/// `observe` is called with the 1-based index of every processed
/// combination, allocated or not, so the caller can report progress.
pub fn allocate(
    combinations: &[Combination],
    grain_names: &GrainNames,
    mut observe: impl FnMut(usize),
) -> AllocationOutcome {
    let mut destination_remaining: HashMap<OrderId, f64> = HashMap::new();
    let mut origin_remaining: HashMap<OrderId, f64> = HashMap::new();
    let mut allocated_per_dest: HashMap<OrderId, f64> = HashMap::new();

    let mut allocations = Vec::new();
    let mut totals = AllocationTotals::default();

    for (idx, comb) in combinations.iter().enumerate() {
        observe(idx + 1);

        let dest_remaining = destination_remaining
            .entry(comb.destination_order.clone())
            .or_insert(comb.amount_provisioned_original);
        let orig_remaining = origin_remaining
            .entry(comb.origin_order.clone())
            .or_insert(comb.amount_origin);
        let already = allocated_per_dest
            .entry(comb.destination_order.clone())
            .or_insert(0.0);

        if *dest_remaining <= 0.0 || *orig_remaining <= 0.0 {
            continue;
        }

        let mut qty = dest_remaining.min(*orig_remaining);
        let cap = comb.amount_provisioned_original;
        if *already + qty > cap {
            qty = cap - *already;
            if qty <= 0.0 {
                continue;
            }
        }

        let revenue = comb.destination_price * qty;
        let cost = comb.origin_price * qty;
        let freight = comb.freight_cost * qty;
        let tax_balance = (comb.origin_credit - comb.destination_tax) * qty;
        let profit_total = comb.profit * qty;

        *dest_remaining -= qty;
        *orig_remaining -= qty;
        *already += qty;

        totals.total_allocated += qty;
        totals.total_revenue += revenue;
        totals.total_cost += cost;
        totals.total_profit += profit_total;
        totals.total_freight += freight;
        totals.total_tax_balance += tax_balance;
        totals.distance_sum += comb.distance;
        totals.routes += 1;

        let grain = grain_display_name(grain_names, &comb.grain);
        *totals.grain_totals.entry(grain.clone()).or_insert(0.0) += qty;

        allocations.push(Allocation {
            destination_order: comb.destination_order.clone(),
            origin_order: comb.origin_order.clone(),
            buyer: comb.buyer.clone(),
            seller: comb.seller.clone(),
            grain,
            amount_allocated: qty,
            revenue,
            cost,
            freight,
            tax_balance,
            profit_total,
            distance: comb.distance,
            from_coords: comb.from_coords,
            to_coords: comb.to_coords,
        });
    }

    AllocationOutcome {
        allocations,
        totals,
    }
}
