//! Reorder service: runs the planner over stored positions. Read-only.

use std::collections::HashMap;

use stockledger_core::{LocationId, ProductId, SupplierId};
use stockledger_planning::{ReorderSuggestion, ScanOptions, SupplierGroup, group_by_supplier, scan};

use crate::error::ServiceResult;
use crate::store::InventoryStore;

#[derive(Debug, Clone)]
pub struct ReorderService<S> {
    store: S,
    default_threshold_percent: u32,
}

impl<S> ReorderService<S>
where
    S: InventoryStore,
{
    pub fn new(store: S, default_threshold_percent: u32) -> Self {
        Self {
            store,
            default_threshold_percent,
        }
    }

    /// Positions below `reorder_point * threshold_percent / 100`.
    pub fn scan(
        &self,
        location: Option<LocationId>,
        threshold_percent: Option<u32>,
    ) -> ServiceResult<Vec<ReorderSuggestion>> {
        let positions = self.store.positions(location)?;
        let options = ScanOptions {
            location,
            threshold_percent: threshold_percent.unwrap_or(self.default_threshold_percent),
        };
        let suggestions = scan(&positions, options);

        tracing::debug!(
            scanned = positions.len(),
            flagged = suggestions.len(),
            threshold_percent = options.threshold_percent,
            "reorder scan"
        );
        Ok(suggestions)
    }

    /// `scan`, grouped by each product's supplier.
    pub fn plan(
        &self,
        location: Option<LocationId>,
        threshold_percent: Option<u32>,
    ) -> ServiceResult<Vec<SupplierGroup>> {
        let suggestions = self.scan(location, threshold_percent)?;

        let mut suppliers: HashMap<ProductId, SupplierId> = HashMap::new();
        for suggestion in &suggestions {
            if suppliers.contains_key(&suggestion.product_id) {
                continue;
            }
            if let Some(supplier_id) = self
                .store
                .product(suggestion.product_id)?
                .and_then(|p| p.supplier_id)
            {
                suppliers.insert(suggestion.product_id, supplier_id);
            }
        }

        Ok(group_by_supplier(suggestions, &suppliers))
    }
}
