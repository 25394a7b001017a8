//! Analysis result cache
//!
//! Memoizes image analyses keyed by image name and runs the expensive
//! analysis in the background.
//!
//! # Entry States
//!
//! | State | Lookup returns | Leaves when |
//! |-------|----------------|-------------|
//! | InProgress | pending (202) | the analysis finishes |
//! | Failed | the stored error | the entry expires |
//! | Succeeded | the stored analysis | the entry expires |
//!
//! Entries expire `ttl` after they were created (not after they finished)
//! and are evicted least-recently-used first once `capacity` is reached.

pub mod clock;
mod coordinator;
pub mod entry;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::JobCoordinator;
pub use entry::{Entry, EntryState, EntryStatus, Resolution};
pub use store::ResultCache;
