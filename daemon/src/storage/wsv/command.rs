//! World-state mutations. Each function performs the minimal record-level
//! checks (existence, uniqueness); business rules live in the command
//! executor on top.

use log::trace;
use takara_common::amount::Amount;
use takara_common::crypto::PublicKey;
use takara_common::model::{AccountId, AssetId, DomainId, Peer, RoleId};
use takara_common::permission::{GrantablePermission, PermissionSet};
use takara_common::serializer::Serializer;

use crate::storage::error::StorageError;
use crate::storage::kv::KvSession;
use crate::storage::ledger_state::TopBlockInfo;
use crate::storage::wsv::{paths, query};

pub fn insert_peer(session: &mut KvSession, peer: &Peer) -> Result<(), StorageError> {
    let key = paths::peer(&peer.public_key);
    if session.get(key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!("peer {}", peer.public_key)));
    }
    session.put(key.as_bytes(), &peer.to_bytes())
}

pub fn remove_peer(session: &mut KvSession, public_key: &PublicKey) -> Result<(), StorageError> {
    let key = paths::peer(public_key);
    if session.get(key.as_bytes())?.is_none() {
        return Err(StorageError::NotFound(format!("peer {}", public_key)));
    }
    session.del(key.as_bytes())
}

pub fn create_domain(
    session: &mut KvSession,
    domain_id: &DomainId,
    default_role: &RoleId,
) -> Result<(), StorageError> {
    if query::get_role_permissions(session, default_role)?.is_none() {
        return Err(StorageError::NotFound(format!("role {}", default_role)));
    }
    let key = paths::domain(domain_id);
    if session.get(key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!("domain {}", domain_id)));
    }
    session.put(key.as_bytes(), &default_role.to_bytes())
}

pub fn create_role(
    session: &mut KvSession,
    role_id: &RoleId,
    permissions: &PermissionSet,
) -> Result<(), StorageError> {
    let key = paths::role(role_id);
    if session.get(key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!("role {}", role_id)));
    }
    session.put(key.as_bytes(), &permissions.to_bytes())
}

pub fn create_asset(
    session: &mut KvSession,
    asset_id: &AssetId,
    precision: u8,
) -> Result<(), StorageError> {
    if query::get_domain_default_role(session, asset_id.domain())?.is_none() {
        return Err(StorageError::NotFound(format!("domain {}", asset_id.domain())));
    }
    let key = paths::asset(asset_id);
    if session.get(key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!("asset {}", asset_id)));
    }
    session.put(key.as_bytes(), &[precision])
}

pub fn create_account(
    session: &mut KvSession,
    account_id: &AccountId,
    public_key: &PublicKey,
) -> Result<(), StorageError> {
    let default_role = query::get_domain_default_role(session, account_id.domain())?
        .ok_or_else(|| StorageError::NotFound(format!("domain {}", account_id.domain())))?;
    let quorum_key = paths::account_quorum(account_id);
    if session.get(quorum_key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!("account {}", account_id)));
    }

    trace!("create account {} with default role {}", account_id, default_role);
    session.put(quorum_key.as_bytes(), &1u16.to_bytes())?;
    session.put(
        paths::account_role(account_id, &default_role).as_bytes(),
        &[],
    )?;
    session.put(paths::signatory(account_id, public_key).as_bytes(), &[])
}

pub fn add_signatory(
    session: &mut KvSession,
    account_id: &AccountId,
    public_key: &PublicKey,
) -> Result<(), StorageError> {
    require_account(session, account_id)?;
    let key = paths::signatory(account_id, public_key);
    if session.get(key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!(
            "signatory {} of {}",
            public_key, account_id
        )));
    }
    session.put(key.as_bytes(), &[])
}

pub fn remove_signatory(
    session: &mut KvSession,
    account_id: &AccountId,
    public_key: &PublicKey,
) -> Result<(), StorageError> {
    let key = paths::signatory(account_id, public_key);
    if session.get(key.as_bytes())?.is_none() {
        return Err(StorageError::NotFound(format!(
            "signatory {} of {}",
            public_key, account_id
        )));
    }
    session.del(key.as_bytes())
}

pub fn set_quorum(
    session: &mut KvSession,
    account_id: &AccountId,
    quorum: u16,
) -> Result<(), StorageError> {
    require_account(session, account_id)?;
    session.put(paths::account_quorum(account_id).as_bytes(), &quorum.to_bytes())
}

pub fn append_role(
    session: &mut KvSession,
    account_id: &AccountId,
    role_id: &RoleId,
) -> Result<(), StorageError> {
    require_account(session, account_id)?;
    if query::get_role_permissions(session, role_id)?.is_none() {
        return Err(StorageError::NotFound(format!("role {}", role_id)));
    }
    let key = paths::account_role(account_id, role_id);
    if session.get(key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!(
            "role {} of {}",
            role_id, account_id
        )));
    }
    session.put(key.as_bytes(), &[])
}

pub fn detach_role(
    session: &mut KvSession,
    account_id: &AccountId,
    role_id: &RoleId,
) -> Result<(), StorageError> {
    let key = paths::account_role(account_id, role_id);
    if session.get(key.as_bytes())?.is_none() {
        return Err(StorageError::NotFound(format!(
            "role {} of {}",
            role_id, account_id
        )));
    }
    session.del(key.as_bytes())
}

pub fn grant_permission(
    session: &mut KvSession,
    from: &AccountId,
    to: &AccountId,
    permission: GrantablePermission,
) -> Result<(), StorageError> {
    require_account(session, to)?;
    let key = paths::grant(from, to, permission);
    if session.get(key.as_bytes())?.is_some() {
        return Err(StorageError::AlreadyExists(format!(
            "grant {} from {} to {}",
            permission, from, to
        )));
    }
    session.put(key.as_bytes(), &[])
}

pub fn revoke_permission(
    session: &mut KvSession,
    from: &AccountId,
    to: &AccountId,
    permission: GrantablePermission,
) -> Result<(), StorageError> {
    let key = paths::grant(from, to, permission);
    if session.get(key.as_bytes())?.is_none() {
        return Err(StorageError::NotFound(format!(
            "grant {} from {} to {}",
            permission, from, to
        )));
    }
    session.del(key.as_bytes())
}

/// Raw balance upsert. Arithmetic and precision rules are the executor's job.
pub fn set_account_asset(
    session: &mut KvSession,
    account_id: &AccountId,
    asset_id: &AssetId,
    amount: &Amount,
) -> Result<(), StorageError> {
    session.put(
        paths::account_asset(account_id, asset_id).as_bytes(),
        &amount.to_bytes(),
    )
}

pub fn set_account_detail(
    session: &mut KvSession,
    account_id: &AccountId,
    writer: &AccountId,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    require_account(session, account_id)?;
    session.put(
        paths::account_detail(account_id, writer, key).as_bytes(),
        value.as_bytes(),
    )
}

pub fn set_setting_value(
    session: &mut KvSession,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    session.put(paths::setting(key).as_bytes(), value.as_bytes())
}

pub fn set_top_block_info(
    session: &mut KvSession,
    info: &TopBlockInfo,
) -> Result<(), StorageError> {
    session.put(paths::TOP_BLOCK_INFO.as_bytes(), &info.to_bytes())
}

fn require_account(session: &mut KvSession, account_id: &AccountId) -> Result<(), StorageError> {
    if query::get_account_quorum(session, account_id)?.is_none() {
        return Err(StorageError::NotFound(format!("account {}", account_id)));
    }
    Ok(())
}
