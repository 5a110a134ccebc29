use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{
    DomainError, DomainResult, LocationId, ProductId, PurchaseOrderId, TransactionId, TransferId,
    UserId,
};

use crate::position::PositionKey;

/// Kind of quantity change recorded by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Purchase,
    Sale,
    TransferIn,
    TransferOut,
    Adjustment,
    Return,
    Damage,
    Expiry,
}

impl TransactionType {
    /// Check the sign of `delta` against this kind.
    ///
    /// Inbound kinds must add stock, outbound kinds must remove it. Adjustments and
    /// returns go either way; only adjustments may record a zero change.
    pub fn validate_delta(self, delta: i64) -> DomainResult<()> {
        let ok = match self {
            TransactionType::Purchase | TransactionType::TransferIn => delta > 0,
            TransactionType::Sale
            | TransactionType::TransferOut
            | TransactionType::Damage
            | TransactionType::Expiry => delta < 0,
            TransactionType::Return => delta != 0,
            TransactionType::Adjustment => true,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "delta {delta} is not valid for a {self:?} transaction"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    Transfer,
    PurchaseOrder,
    Sale,
}

/// Pointer to the order that caused a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub id: Uuid,
}

impl Reference {
    pub fn transfer(id: TransferId) -> Self {
        Self {
            kind: ReferenceKind::Transfer,
            id: id.into(),
        }
    }

    pub fn purchase_order(id: PurchaseOrderId) -> Self {
        Self {
            kind: ReferenceKind::PurchaseOrder,
            id: id.into(),
        }
    }

    pub fn sale(id: Uuid) -> Self {
        Self {
            kind: ReferenceKind::Sale,
            id,
        }
    }
}

/// One immutable, signed quantity change. The system of record for stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub kind: TransactionType,
    pub delta: i64,
    /// On-hand quantity right after this transaction.
    pub resulting_balance: i64,
    pub actor: UserId,
    pub reference: Option<Reference>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl StockTransaction {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.product_id, self.location_id)
    }
}

/// Running sum of deltas; must equal the position's on-hand quantity.
pub fn ledger_balance<'a>(transactions: impl IntoIterator<Item = &'a StockTransaction>) -> i64 {
    transactions.into_iter().map(|t| t.delta).sum()
}
