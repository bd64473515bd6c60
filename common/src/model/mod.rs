mod id;
mod peer;

pub use id::{AccountId, AssetId, DomainId, IdError, RoleId};
pub use peer::Peer;
