//! Decide/evolve contract for stateful records.
//!
//! A record that changes through commands (a catalog product receiving stock
//! movements) splits the change in two:
//!
//! ```text
//!   command ──handle(&self)──▶ [events] ──apply(&mut self)──▶ new state
//!                (pure, may reject)          (infallible, bumps version)
//! ```
//!
//! Storage commits the evolved state conditionally on the version that was
//! read before `handle`, see [`ExpectedVersion`].

/// Identity and revision of a stored record.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Revision counter, +1 per applied event or catalog edit.
    fn version(&self) -> u64;
}

/// Version a conditional write expects to find in storage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Unconditional write.
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, stored: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == stored,
        }
    }
}

/// Pure decision logic plus deterministic state evolution. No IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve state from one accepted event.
    fn apply(&mut self, event: &Self::Event);

    /// Validate `command` against current state and return the events it
    /// produces. Must leave `self` untouched.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
