//! Per-pair economics for candidate combinations.

use super::entities::{BuyOrder, Combination, EconomicParams, SellOrder};

impl Combination {
    /// Build the candidate pairing of `sale` and `purchase` at the given
    /// driving distance.
    ///
    /// The caller is responsible for only pairing orders of the same grain;
    /// this constructor does not filter. Economics are per bag:
    /// freight = max(distance * rate, floor), PIS credit/debit applied on
    /// whichever side is flagged, and
    /// profit = destination price - (origin price + freight + net tax).
    /// A negative profit is recorded like any other; the allocation pass
    /// does not select on profit.
    pub fn evaluate(
        sale: &SellOrder,
        purchase: &BuyOrder,
        distance_km: f64,
        params: &EconomicParams,
    ) -> Self {
        let freight_cost = params.freight(distance_km);
        let origin_credit = params.pis_tax(purchase.bag_price, purchase.has_pis);
        let destination_tax = params.pis_tax(sale.bag_price, sale.has_pis);
        let effective_origin_cost =
            purchase.bag_price + freight_cost + (destination_tax - origin_credit);
        let profit = sale.bag_price - effective_origin_cost;

        Self {
            destination_order: sale.id.clone(),
            origin_order: purchase.id.clone(),
            buyer: sale.buyer.clone(),
            seller: purchase.seller.clone(),
            grain: sale.grain.clone(),
            destination_price: sale.bag_price,
            origin_price: purchase.bag_price,
            amount_destination: sale.amount,
            amount_origin: purchase.amount,
            freight_cost,
            origin_credit,
            destination_tax,
            effective_origin_cost,
            profit,
            distance: distance_km,
            from_coords: purchase.origin.coords,
            to_coords: sale.destination.coords,
            amount_provisioned_original: sale.amount_provisioned_original,
            amount_allocated_original: sale.amount_provisioned_original.min(purchase.amount),
        }
    }
}
