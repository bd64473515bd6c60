//! Canonical key paths of the world state view.
//!
//! Every path stays within the radix-tree alphabet so cache and engine agree
//! on what a key is. Layout:
//!
//! ```text
//! wsv/network/peers/{pubkey}          -> Peer
//! wsv/d/{domain}                      -> default RoleId
//! wsv/d/{domain}/ast/{asset}          -> precision (u8)
//! wsv/d/{domain}/a/{account}/q        -> quorum (u16)
//! wsv/d/{domain}/a/{account}/r/{role} -> ()
//! wsv/d/{domain}/a/{account}/s/{key}  -> ()
//! wsv/d/{domain}/a/{account}/ast/{asset_id}          -> Amount
//! wsv/d/{domain}/a/{account}/dt/{writer}/{key}       -> String
//! wsv/d/{domain}/a/{account}/g/{grantee}/{permission} -> ()
//! wsv/r/{role}                        -> PermissionSet
//! wsv/stg/{key}                       -> String
//! wsv/tbi                             -> TopBlockInfo
//! ```

use takara_common::crypto::PublicKey;
use takara_common::model::{AccountId, AssetId, DomainId, RoleId};
use takara_common::permission::GrantablePermission;

pub const WSV_ROOT: &str = "wsv/";
pub const PEERS_PREFIX: &str = "wsv/network/peers/";
pub const ROLES_PREFIX: &str = "wsv/r/";
pub const SETTINGS_PREFIX: &str = "wsv/stg/";
pub const TOP_BLOCK_INFO: &str = "wsv/tbi";

pub fn peer(public_key: &PublicKey) -> String {
    format!("{}{}", PEERS_PREFIX, public_key.to_hex())
}

pub fn domain(domain_id: &DomainId) -> String {
    format!("wsv/d/{}", domain_id)
}

pub fn asset(asset_id: &AssetId) -> String {
    format!("wsv/d/{}/ast/{}", asset_id.domain(), asset_id.name())
}

pub fn role(role_id: &RoleId) -> String {
    format!("{}{}", ROLES_PREFIX, role_id)
}

pub fn account(account_id: &AccountId) -> String {
    format!("wsv/d/{}/a/{}", account_id.domain(), account_id.name())
}

pub fn account_quorum(account_id: &AccountId) -> String {
    format!("{}/q", account(account_id))
}

pub fn account_roles_prefix(account_id: &AccountId) -> String {
    format!("{}/r/", account(account_id))
}

pub fn account_role(account_id: &AccountId, role_id: &RoleId) -> String {
    format!("{}{}", account_roles_prefix(account_id), role_id)
}

pub fn signatories_prefix(account_id: &AccountId) -> String {
    format!("{}/s/", account(account_id))
}

pub fn signatory(account_id: &AccountId, public_key: &PublicKey) -> String {
    format!("{}{}", signatories_prefix(account_id), public_key.to_hex())
}

pub fn account_assets_prefix(account_id: &AccountId) -> String {
    format!("{}/ast/", account(account_id))
}

pub fn account_asset(account_id: &AccountId, asset_id: &AssetId) -> String {
    format!("{}{}", account_assets_prefix(account_id), asset_id)
}

pub fn account_details_prefix(account_id: &AccountId) -> String {
    format!("{}/dt/", account(account_id))
}

pub fn account_detail(account_id: &AccountId, writer: &AccountId, key: &str) -> String {
    format!("{}{}/{}", account_details_prefix(account_id), writer, key)
}

pub fn grants_prefix(account_id: &AccountId) -> String {
    format!("{}/g/", account(account_id))
}

pub fn grant(
    account_id: &AccountId,
    grantee: &AccountId,
    permission: GrantablePermission,
) -> String {
    format!("{}{}/{}", grants_prefix(account_id), grantee, permission)
}

pub fn setting(key: &str) -> String {
    format!("{}{}", SETTINGS_PREFIX, key)
}
