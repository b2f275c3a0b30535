//! Synchronization orchestration.
//!
//! Each entity family moves through `Hydrating -> Live <-> Degraded`: the
//! local snapshot is shown first, a remote fetch replaces it while online, and
//! on failure the last snapshot stays authoritative.

mod collection;
mod context;
pub mod matrix;
mod notify;
mod session;
mod slice;

pub use collection::CollectionSync;
pub use context::SyncContext;
pub use notify::{Level, Notification, Notifier, SyncEvent};
pub use session::SessionSync;
pub use slice::{Slice, SliceState, SyncPhase};
