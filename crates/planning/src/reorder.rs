use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use stockledger_core::{LocationId, ProductId, SupplierId};
use stockledger_inventory::InventoryPosition;

/// Proposed replenishment for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderSuggestion {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub current_quantity: i64,
    pub reorder_point: i64,
    pub min_stock_level: i64,
    pub suggested_quantity: i64,
    /// Last known cost price at the location, for pricing a draft order.
    pub unit_cost: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub location: Option<LocationId>,
    /// Percentage of the reorder point below which a position is flagged.
    pub threshold_percent: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            location: None,
            threshold_percent: 100,
        }
    }
}

/// `max(min_stock_level - current, reorder_point - current, 0)`.
pub fn suggested_quantity(current: i64, reorder_point: i64, min_stock_level: i64) -> i64 {
    (min_stock_level - current).max(reorder_point - current).max(0)
}

/// `current < reorder_point * threshold_percent / 100`, without integer truncation.
pub fn needs_reorder(current: i64, reorder_point: i64, threshold_percent: u32) -> bool {
    i128::from(current) * 100 < i128::from(reorder_point) * i128::from(threshold_percent)
}

/// Emit a suggestion for every position below its threshold, ordered by location
/// then product.
pub fn scan<'a>(
    positions: impl IntoIterator<Item = &'a InventoryPosition>,
    options: ScanOptions,
) -> Vec<ReorderSuggestion> {
    let mut suggestions: Vec<ReorderSuggestion> = positions
        .into_iter()
        .filter(|p| options.location.is_none_or(|loc| p.location_id() == loc))
        .filter_map(|p| {
            let thresholds = p.thresholds();
            let current = p.quantity_on_hand();
            if !needs_reorder(current, thresholds.reorder_point, options.threshold_percent) {
                return None;
            }
            Some(ReorderSuggestion {
                product_id: p.product_id(),
                location_id: p.location_id(),
                current_quantity: current,
                reorder_point: thresholds.reorder_point,
                min_stock_level: thresholds.min_stock_level,
                suggested_quantity: suggested_quantity(
                    current,
                    thresholds.reorder_point,
                    thresholds.min_stock_level,
                ),
                unit_cost: p.cost_price(),
            })
        })
        .collect();

    suggestions.sort_by_key(|s| (s.location_id, s.product_id));
    suggestions
}

/// Product → supplier lookup used only for grouping.
pub trait SupplierLookup {
    fn supplier_of(&self, product_id: ProductId) -> Option<SupplierId>;
}

impl SupplierLookup for HashMap<ProductId, SupplierId> {
    fn supplier_of(&self, product_id: ProductId) -> Option<SupplierId> {
        self.get(&product_id).copied()
    }
}

/// Suggestions sharing a supplier. `supplier_id == None` collects products with
/// no known supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierGroup {
    pub supplier_id: Option<SupplierId>,
    pub suggestions: Vec<ReorderSuggestion>,
}

impl SupplierGroup {
    pub fn total_quantity(&self) -> i64 {
        self.suggestions.iter().map(|s| s.suggested_quantity).sum()
    }

    pub fn estimated_cost(&self) -> u64 {
        self.suggestions
            .iter()
            .map(|s| s.unit_cost.saturating_mul(s.suggested_quantity.unsigned_abs()))
            .fold(0, u64::saturating_add)
    }
}

/// Group suggestions by supplier. Quantities are passed through untouched.
///
/// Known suppliers come first in id order; the unassigned group, if any, is last.
pub fn group_by_supplier(
    suggestions: Vec<ReorderSuggestion>,
    lookup: &impl SupplierLookup,
) -> Vec<SupplierGroup> {
    let mut known: BTreeMap<SupplierId, Vec<ReorderSuggestion>> = BTreeMap::new();
    let mut unassigned = Vec::new();

    for suggestion in suggestions {
        match lookup.supplier_of(suggestion.product_id) {
            Some(supplier_id) => known.entry(supplier_id).or_default().push(suggestion),
            None => unassigned.push(suggestion),
        }
    }

    let mut groups: Vec<SupplierGroup> = known
        .into_iter()
        .map(|(supplier_id, suggestions)| SupplierGroup {
            supplier_id: Some(supplier_id),
            suggestions,
        })
        .collect();

    if !unassigned.is_empty() {
        groups.push(SupplierGroup {
            supplier_id: None,
            suggestions: unassigned,
        });
    }

    groups
}
