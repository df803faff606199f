//! Versioned aggregate roots.

/// Aggregate root marker + minimal interface.
///
/// Stores persist the version alongside the record and use it for conditional
/// (compare-and-swap) updates, so two writers debiting the same batch cannot
/// silently overwrite each other.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state (+1 per mutation).
    fn version(&self) -> u64;
}
