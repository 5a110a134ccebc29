//! Stock locations: the places stock can exist.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::LocationId;

/// What kind of place a location is. Exactly one kind per location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKind {
    Warehouse,
    Store,
}

/// A warehouse or a store.
///
/// Identity, kind and name are fixed at creation; only the active flag changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLocation {
    id: LocationId,
    kind: LocationKind,
    name: String,
    active: bool,
}

impl StockLocation {
    pub fn new(id: LocationId, kind: LocationKind, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        Ok(Self {
            id,
            kind,
            name,
            active: true,
        })
    }

    pub fn warehouse(id: LocationId, name: impl Into<String>) -> DomainResult<Self> {
        Self::new(id, LocationKind::Warehouse, name)
    }

    pub fn store(id: LocationId, name: impl Into<String>) -> DomainResult<Self> {
        Self::new(id, LocationKind::Store, name)
    }

    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_warehouse(&self) -> bool {
        self.kind == LocationKind::Warehouse
    }

    /// Copy of this location with a different active flag.
    pub fn with_active(&self, active: bool) -> Self {
        Self {
            active,
            ..self.clone()
        }
    }

    /// Whether `next` is a legal replacement for `self` (same identity, kind, name).
    pub fn is_compatible_update(&self, next: &StockLocation) -> bool {
        self.id == next.id && self.kind == next.kind && self.name == next.name
    }
}
