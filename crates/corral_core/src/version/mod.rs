//! Bitemporal object-version ledger.
//!
//! Every persisted object carries a chain of version rows, each valid over
//! a `[valid_from, valid_to)` window; the row with a null `valid_to` is the
//! current one. The ledger performs the optimistic "is this still current"
//! check that the lock tracker and save paths rely on.

mod clock;
mod ledger;
mod recency;

pub use clock::LogicalClock;
pub use ledger::{AppliedChange, ChangeKind, VersionLedger, VersionRecord};
pub use recency::ModificationCache;
