//! World-state reads, the dual of [`command`](super::command).

use takara_common::amount::Amount;
use takara_common::crypto::PublicKey;
use takara_common::model::{AccountId, AssetId, DomainId, Peer, RoleId};
use takara_common::permission::{GrantablePermission, PermissionSet};
use takara_common::serializer::Serializer;

use crate::storage::error::StorageError;
use crate::storage::kv::KvSession;
use crate::storage::ledger_state::TopBlockInfo;
use crate::storage::wsv::paths;

pub fn get_peer(
    session: &mut KvSession,
    public_key: &PublicKey,
) -> Result<Option<Peer>, StorageError> {
    let key = paths::peer(public_key);
    match session.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(Peer::from_bytes(&bytes).map_err(|_| corrupted(&key))?)),
        None => Ok(None),
    }
}

/// Peer list filtered by the syncing flag.
pub fn get_peers(session: &mut KvSession, syncing: bool) -> Result<Vec<Peer>, StorageError> {
    let mut peers = Vec::new();
    for (key, value) in session.seek(paths::PEERS_PREFIX.as_bytes())? {
        let peer = Peer::from_bytes(&value)
            .map_err(|_| corrupted(&String::from_utf8_lossy(&key)))?;
        if peer.syncing == syncing {
            peers.push(peer);
        }
    }
    Ok(peers)
}

pub fn get_domain_default_role(
    session: &mut KvSession,
    domain_id: &DomainId,
) -> Result<Option<RoleId>, StorageError> {
    let key = paths::domain(domain_id);
    match session.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(
            RoleId::from_bytes(&bytes).map_err(|_| corrupted(&key))?,
        )),
        None => Ok(None),
    }
}

pub fn get_role_permissions(
    session: &mut KvSession,
    role_id: &RoleId,
) -> Result<Option<PermissionSet>, StorageError> {
    let key = paths::role(role_id);
    match session.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(
            PermissionSet::from_bytes(&bytes).map_err(|_| corrupted(&key))?,
        )),
        None => Ok(None),
    }
}

pub fn get_account_quorum(
    session: &mut KvSession,
    account_id: &AccountId,
) -> Result<Option<u16>, StorageError> {
    let key = paths::account_quorum(account_id);
    match session.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(u16::from_bytes(&bytes).map_err(|_| corrupted(&key))?)),
        None => Ok(None),
    }
}

pub fn get_signatories(
    session: &mut KvSession,
    account_id: &AccountId,
) -> Result<Vec<PublicKey>, StorageError> {
    let prefix = paths::signatories_prefix(account_id);
    let mut signatories = Vec::new();
    for (key, _) in session.seek(prefix.as_bytes())? {
        let hex = &key[prefix.len()..];
        let hex = std::str::from_utf8(hex).map_err(|_| corrupted(&prefix))?;
        signatories.push(PublicKey::from_hex(hex).map_err(|_| corrupted(&prefix))?);
    }
    Ok(signatories)
}

pub fn get_account_roles(
    session: &mut KvSession,
    account_id: &AccountId,
) -> Result<Vec<RoleId>, StorageError> {
    let prefix = paths::account_roles_prefix(account_id);
    let mut roles = Vec::new();
    for (key, _) in session.seek(prefix.as_bytes())? {
        let name = std::str::from_utf8(&key[prefix.len()..]).map_err(|_| corrupted(&prefix))?;
        roles.push(name.parse().map_err(|_| corrupted(&prefix))?);
    }
    Ok(roles)
}

/// Union of the permissions of every role attached to the account.
pub fn get_account_permissions(
    session: &mut KvSession,
    account_id: &AccountId,
) -> Result<PermissionSet, StorageError> {
    let mut permissions = PermissionSet::empty();
    for role in get_account_roles(session, account_id)? {
        if let Some(role_permissions) = get_role_permissions(session, &role)? {
            permissions = permissions.union(&role_permissions);
        }
    }
    Ok(permissions)
}

pub fn get_asset_precision(
    session: &mut KvSession,
    asset_id: &AssetId,
) -> Result<Option<u8>, StorageError> {
    let key = paths::asset(asset_id);
    match session.get(key.as_bytes())? {
        Some(bytes) if bytes.len() == 1 => Ok(Some(bytes[0])),
        Some(_) => Err(corrupted(&key)),
        None => Ok(None),
    }
}

pub fn get_account_asset(
    session: &mut KvSession,
    account_id: &AccountId,
    asset_id: &AssetId,
) -> Result<Option<Amount>, StorageError> {
    let key = paths::account_asset(account_id, asset_id);
    match session.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(
            Amount::from_bytes(&bytes).map_err(|_| corrupted(&key))?,
        )),
        None => Ok(None),
    }
}

pub fn get_account_assets(
    session: &mut KvSession,
    account_id: &AccountId,
) -> Result<Vec<(AssetId, Amount)>, StorageError> {
    let prefix = paths::account_assets_prefix(account_id);
    let mut assets = Vec::new();
    for (key, value) in session.seek(prefix.as_bytes())? {
        let id = std::str::from_utf8(&key[prefix.len()..]).map_err(|_| corrupted(&prefix))?;
        assets.push((
            id.parse().map_err(|_| corrupted(&prefix))?,
            Amount::from_bytes(&value).map_err(|_| corrupted(&prefix))?,
        ));
    }
    Ok(assets)
}

pub fn get_account_detail(
    session: &mut KvSession,
    account_id: &AccountId,
    writer: &AccountId,
    key: &str,
) -> Result<Option<String>, StorageError> {
    let path = paths::account_detail(account_id, writer, key);
    match session.get(path.as_bytes())? {
        Some(bytes) => Ok(Some(
            String::from_utf8(bytes).map_err(|_| corrupted(&path))?,
        )),
        None => Ok(None),
    }
}

pub fn has_grantable_permission(
    session: &mut KvSession,
    from: &AccountId,
    to: &AccountId,
    permission: GrantablePermission,
) -> Result<bool, StorageError> {
    let key = paths::grant(from, to, permission);
    Ok(session.get(key.as_bytes())?.is_some())
}

pub fn get_setting(session: &mut KvSession, key: &str) -> Result<Option<String>, StorageError> {
    let path = paths::setting(key);
    match session.get(path.as_bytes())? {
        Some(bytes) => Ok(Some(
            String::from_utf8(bytes).map_err(|_| corrupted(&path))?,
        )),
        None => Ok(None),
    }
}

pub fn get_top_block_info(session: &mut KvSession) -> Result<Option<TopBlockInfo>, StorageError> {
    match session.get(paths::TOP_BLOCK_INFO.as_bytes())? {
        Some(bytes) => Ok(Some(
            TopBlockInfo::from_bytes(&bytes).map_err(|_| corrupted(paths::TOP_BLOCK_INFO))?,
        )),
        None => Ok(None),
    }
}

fn corrupted(key: &str) -> StorageError {
    StorageError::Corrupted(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::{KvBackend, KvSession, MemoryBackend};
    use crate::storage::wsv::command;
    use std::sync::Arc;
    use takara_common::permission::RolePermission;

    fn session() -> KvSession {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let mut session = KvSession::new(backend, &[]);
        session.begin().unwrap();
        session
    }

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_account_lifecycle() {
        let mut s = session();
        let role: RoleId = "user".parse().unwrap();
        let domain: DomainId = "wonderland".parse().unwrap();
        let account: AccountId = "alice@wonderland".parse().unwrap();

        command::create_role(&mut s, &role, &PermissionSet::from_iter([RolePermission::Receive]))
            .unwrap();
        command::create_domain(&mut s, &domain, &role).unwrap();
        command::create_account(&mut s, &account, &key(1)).unwrap();

        assert_eq!(get_account_quorum(&mut s, &account).unwrap(), Some(1));
        assert_eq!(get_signatories(&mut s, &account).unwrap(), vec![key(1)]);
        assert_eq!(get_account_roles(&mut s, &account).unwrap(), vec![role.clone()]);
        assert!(get_account_permissions(&mut s, &account)
            .unwrap()
            .contains(RolePermission::Receive));

        // duplicates are rejected
        assert!(matches!(
            command::create_account(&mut s, &account, &key(1)),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(matches!(
            command::create_domain(&mut s, &domain, &role),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_missing_domain_rejected() {
        let mut s = session();
        let account: AccountId = "alice@nowhere".parse().unwrap();
        assert!(matches!(
            command::create_account(&mut s, &account, &key(1)),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_peers_by_syncing_flag() {
        let mut s = session();
        command::insert_peer(&mut s, &Peer::new(key(1), "p1:50541")).unwrap();
        command::insert_peer(&mut s, &Peer::syncing(key(2), "p2:50541")).unwrap();

        assert_eq!(get_peers(&mut s, false).unwrap().len(), 1);
        assert_eq!(get_peers(&mut s, true).unwrap().len(), 1);
        assert!(get_peer(&mut s, &key(2)).unwrap().unwrap().syncing);

        command::remove_peer(&mut s, &key(2)).unwrap();
        assert!(get_peers(&mut s, true).unwrap().is_empty());
        assert!(command::remove_peer(&mut s, &key(2)).is_err());
    }

    #[test]
    fn test_grantable_permissions() {
        let mut s = session();
        let role: RoleId = "user".parse().unwrap();
        let domain: DomainId = "wonderland".parse().unwrap();
        let alice: AccountId = "alice@wonderland".parse().unwrap();
        let bob: AccountId = "bob@wonderland".parse().unwrap();
        command::create_role(&mut s, &role, &PermissionSet::empty()).unwrap();
        command::create_domain(&mut s, &domain, &role).unwrap();
        command::create_account(&mut s, &alice, &key(1)).unwrap();
        command::create_account(&mut s, &bob, &key(2)).unwrap();

        let permission = GrantablePermission::TransferMyAssets;
        assert!(!has_grantable_permission(&mut s, &alice, &bob, permission).unwrap());
        command::grant_permission(&mut s, &alice, &bob, permission).unwrap();
        assert!(has_grantable_permission(&mut s, &alice, &bob, permission).unwrap());
        command::revoke_permission(&mut s, &alice, &bob, permission).unwrap();
        assert!(!has_grantable_permission(&mut s, &alice, &bob, permission).unwrap());
    }

    #[test]
    fn test_settings_and_top_block() {
        let mut s = session();
        assert!(get_setting(&mut s, "limit").unwrap().is_none());
        command::set_setting_value(&mut s, "limit", "4096").unwrap();
        assert_eq!(get_setting(&mut s, "limit").unwrap().unwrap(), "4096");

        assert!(get_top_block_info(&mut s).unwrap().is_none());
        let info = TopBlockInfo::new(5, takara_common::crypto::hash(b"five"));
        command::set_top_block_info(&mut s, &info).unwrap();
        assert_eq!(get_top_block_info(&mut s).unwrap().unwrap(), info);
    }
}
