//! Event-sourced order aggregates (transfers, purchase orders).
//!
//! Stock positions are not aggregates: they are plain versioned records owned by
//! the ledger. Only orders keep a stream of facts.

use crate::error::{DomainError, DomainResult};

pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far; equals the stream revision.
    fn version(&self) -> u64;
}

/// Revision a writer last saw, checked again at commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Nothing has been written yet.
    NoStream,
    Exact(u64),
}

impl ExpectedVersion {
    /// `0` means never written.
    pub fn at(version: u64) -> Self {
        match version {
            0 => ExpectedVersion::NoStream,
            v => ExpectedVersion::Exact(v),
        }
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::NoStream => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    /// A mismatch is a `ConcurrentModification`, which callers may retry.
    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "expected {self:?}, stream is at revision {actual}"
        )))
    }
}

/// Decide/evolve split of an order.
///
/// `handle` validates a command against current state and returns the facts it
/// produces, or an empty list when the command was already applied. `apply`
/// folds one fact into state and bumps the version. Neither may touch stock or
/// any other IO; stock effects are staged by the caller from the returned facts.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
