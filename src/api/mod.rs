//! Remote fetch layer: the REST client and the records it exchanges.

pub mod client;
pub mod error;
pub mod keys;
pub mod types;
pub mod wire;

pub use client::ApiClient;
pub use error::FetchError;
pub use keys::ResourceKey;
pub use types::{Permission, RolePermission, SessionRecord};
