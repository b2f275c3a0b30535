//! Network reachability.

mod connectivity;

pub use connectivity::{Connectivity, LinkState};
