use chrono::{DateTime, Utc};

/// A fact recorded on an order stream (transfer or purchase order).
///
/// Events are never edited once appended; a changed payload shape gets a new
/// `version` so stored streams keep deserializing.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `<context>.<aggregate>.<fact>` (e.g. "transfers.transfer.dispatched").
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time carried by the command that caused it.
    fn occurred_at(&self) -> DateTime<Utc>;
}
