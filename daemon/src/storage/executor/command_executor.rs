//! Executes single ledger commands inside the KV transaction.
//!
//! In validating mode each command is gated by the creator's role
//! permissions, domain scope or a grantable permission delegated by the
//! target account; the `root` permission bypasses every gate. Business rules
//! (balances, precisions, quorum bounds, last-peer protection) apply in both
//! modes.

use std::fmt;
use std::sync::Arc;

use log::trace;
use takara_common::amount::{Amount, AmountError};
use takara_common::command::Command;
use takara_common::model::{AccountId, AssetId};
use takara_common::permission::{GrantablePermission, PermissionSet, RolePermission};

use crate::storage::error::StorageError;
use crate::storage::executor::error_code;
use crate::storage::kv::{KvBackend, KvSession};
use crate::storage::wsv::{command as wsv, query};

/// Outcome of a rejected command: which command, a stable numeric code and a
/// human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub command_name: &'static str,
    pub error_code: u32,
    pub error_extra: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed with code {}: {}",
            self.command_name, self.error_code, self.error_extra
        )
    }
}

/// External VM call-out used by `CallEngine`.
pub trait VmCaller: Send + Sync {
    fn call(
        &self,
        session: &mut KvSession,
        caller: &AccountId,
        callee: Option<&str>,
        input: &[u8],
    ) -> Result<String, String>;
}

pub struct CommandExecutor {
    session: KvSession,
    vm_caller: Option<Arc<dyn VmCaller>>,
}

impl CommandExecutor {
    pub fn new(backend: Arc<dyn KvBackend>, cacheable_paths: &[String]) -> Self {
        Self {
            session: KvSession::new(backend, cacheable_paths),
            vm_caller: None,
        }
    }

    pub fn with_vm_caller(mut self, vm_caller: Arc<dyn VmCaller>) -> Self {
        self.vm_caller = Some(vm_caller);
        self
    }

    pub fn session(&mut self) -> &mut KvSession {
        &mut self.session
    }

    pub fn execute(
        &mut self,
        command: &Command,
        creator: &AccountId,
        do_validation: bool,
    ) -> Result<(), CommandError> {
        trace!("execute {} for {}", command.name(), creator);
        let name = command.name();

        let creator_permissions = if do_validation {
            let permissions = query::get_account_permissions(&mut self.session, creator)
                .map_err(|e| wrap(name, e))?;
            if query::get_account_quorum(&mut self.session, creator)
                .map_err(|e| wrap(name, e))?
                .is_none()
            {
                return Err(CommandError {
                    command_name: name,
                    error_code: error_code::NOT_FOUND,
                    error_extra: format!("creator account {} not found", creator),
                });
            }
            permissions
        } else {
            PermissionSet::empty()
        };
        let is_root = creator_permissions.contains(RolePermission::Root);
        let validate = do_validation && !is_root;

        match command {
            Command::AddAssetQuantity { asset_id, amount } => {
                if validate && !creator_permissions.contains(RolePermission::AddAssetQuantity) {
                    return Err(denied(name, "missing add_asset_quantity permission"));
                }
                self.add_to_balance(name, creator, asset_id, amount)
            }
            Command::SubtractAssetQuantity { asset_id, amount } => {
                if validate && !creator_permissions.contains(RolePermission::SubtractAssetQuantity)
                {
                    return Err(denied(name, "missing subtract_asset_quantity permission"));
                }
                self.subtract_from_balance(name, creator, asset_id, amount)
            }
            Command::AddPeer { peer } => {
                if validate && !creator_permissions.contains(RolePermission::AddPeer) {
                    return Err(denied(name, "missing add_peer permission"));
                }
                wsv::insert_peer(&mut self.session, peer).map_err(|e| wrap(name, e))
            }
            Command::RemovePeer { public_key } => {
                if validate && !creator_permissions.contains(RolePermission::RemovePeer) {
                    return Err(denied(name, "missing remove_peer permission"));
                }
                self.remove_peer(name, public_key)
            }
            Command::AddSignatory {
                account_id,
                public_key,
            } => {
                if validate
                    && !self.allowed_on_account(
                        creator,
                        account_id,
                        &creator_permissions,
                        RolePermission::AddSignatory,
                        GrantablePermission::AddMySignatory,
                    )
                    .map_err(|e| wrap(name, e))?
                {
                    return Err(denied(name, "missing add_signatory permission"));
                }
                wsv::add_signatory(&mut self.session, account_id, public_key)
                    .map_err(|e| wrap(name, e))
            }
            Command::RemoveSignatory {
                account_id,
                public_key,
            } => {
                if validate
                    && !self.allowed_on_account(
                        creator,
                        account_id,
                        &creator_permissions,
                        RolePermission::RemoveSignatory,
                        GrantablePermission::RemoveMySignatory,
                    )
                    .map_err(|e| wrap(name, e))?
                {
                    return Err(denied(name, "missing remove_signatory permission"));
                }
                self.remove_signatory(name, account_id, public_key)
            }
            Command::SetQuorum {
                account_id,
                quorum,
            } => {
                if validate
                    && !self.allowed_on_account(
                        creator,
                        account_id,
                        &creator_permissions,
                        RolePermission::SetQuorum,
                        GrantablePermission::SetMyQuorum,
                    )
                    .map_err(|e| wrap(name, e))?
                {
                    return Err(denied(name, "missing set_quorum permission"));
                }
                self.set_quorum(name, account_id, *quorum)
            }
            Command::CreateAccount {
                account_name,
                domain_id,
                public_key,
            } => {
                if validate && !creator_permissions.contains(RolePermission::CreateAccount) {
                    return Err(denied(name, "missing create_account permission"));
                }
                let account_id = AccountId::new(account_name.clone(), domain_id.clone())
                    .map_err(|e| precondition(name, e.to_string()))?;
                wsv::create_account(&mut self.session, &account_id, public_key)
                    .map_err(|e| wrap(name, e))
            }
            Command::CreateAsset {
                asset_name,
                domain_id,
                precision,
            } => {
                if validate && !creator_permissions.contains(RolePermission::CreateAsset) {
                    return Err(denied(name, "missing create_asset permission"));
                }
                let asset_id = AssetId::new(asset_name.clone(), domain_id.clone())
                    .map_err(|e| precondition(name, e.to_string()))?;
                wsv::create_asset(&mut self.session, &asset_id, *precision)
                    .map_err(|e| wrap(name, e))
            }
            Command::CreateDomain {
                domain_id,
                default_role,
            } => {
                if validate && !creator_permissions.contains(RolePermission::CreateDomain) {
                    return Err(denied(name, "missing create_domain permission"));
                }
                wsv::create_domain(&mut self.session, domain_id, default_role)
                    .map_err(|e| wrap(name, e))
            }
            Command::CreateRole {
                role_id,
                permissions,
            } => {
                if validate {
                    if !creator_permissions.contains(RolePermission::CreateRole) {
                        return Err(denied(name, "missing create_role permission"));
                    }
                    // a role must not escalate above its creator
                    if !creator_permissions.contains_all(permissions) {
                        return Err(denied(name, "role exceeds creator permissions"));
                    }
                }
                wsv::create_role(&mut self.session, role_id, permissions)
                    .map_err(|e| wrap(name, e))
            }
            Command::AppendRole {
                account_id,
                role_id,
            } => {
                if validate {
                    if !creator_permissions.contains(RolePermission::AppendRole) {
                        return Err(denied(name, "missing append_role permission"));
                    }
                    let role_permissions =
                        query::get_role_permissions(&mut self.session, role_id)
                            .map_err(|e| wrap(name, e))?
                            .unwrap_or_default();
                    if !creator_permissions.contains_all(&role_permissions) {
                        return Err(denied(name, "role exceeds creator permissions"));
                    }
                }
                wsv::append_role(&mut self.session, account_id, role_id)
                    .map_err(|e| wrap(name, e))
            }
            Command::DetachRole {
                account_id,
                role_id,
            } => {
                if validate && !creator_permissions.contains(RolePermission::DetachRole) {
                    return Err(denied(name, "missing detach_role permission"));
                }
                wsv::detach_role(&mut self.session, account_id, role_id)
                    .map_err(|e| wrap(name, e))
            }
            Command::GrantPermission {
                account_id,
                permission,
            } => {
                if validate && !creator_permissions.contains(permission.required_to_grant()) {
                    return Err(denied(name, "missing grant permission"));
                }
                wsv::grant_permission(&mut self.session, creator, account_id, *permission)
                    .map_err(|e| wrap(name, e))
            }
            Command::RevokePermission {
                account_id,
                permission,
            } => wsv::revoke_permission(&mut self.session, creator, account_id, *permission)
                .map_err(|e| wrap(name, e)),
            Command::SetAccountDetail {
                account_id,
                key,
                value,
            } => {
                if validate
                    && account_id != creator
                    && !self
                        .allowed_on_account(
                            creator,
                            account_id,
                            &creator_permissions,
                            RolePermission::SetAccountDetail,
                            GrantablePermission::SetMyAccountDetail,
                        )
                        .map_err(|e| wrap(name, e))?
                {
                    return Err(denied(name, "missing set_account_detail permission"));
                }
                wsv::set_account_detail(&mut self.session, account_id, creator, key, value)
                    .map_err(|e| wrap(name, e))
            }
            Command::CompareAndSetAccountDetail {
                account_id,
                key,
                value,
                old_value,
                check_empty,
            } => {
                if validate
                    && account_id != creator
                    && !self
                        .allowed_on_account(
                            creator,
                            account_id,
                            &creator_permissions,
                            RolePermission::SetAccountDetail,
                            GrantablePermission::SetMyAccountDetail,
                        )
                        .map_err(|e| wrap(name, e))?
                {
                    return Err(denied(name, "missing set_account_detail permission"));
                }
                self.compare_and_set_detail(
                    name,
                    creator,
                    account_id,
                    key,
                    value,
                    old_value.as_deref(),
                    *check_empty,
                )
            }
            Command::TransferAsset {
                src_account_id,
                dest_account_id,
                asset_id,
                description: _,
                amount,
            } => {
                if validate {
                    let allowed = if src_account_id == creator {
                        creator_permissions.contains(RolePermission::Transfer)
                    } else {
                        query::has_grantable_permission(
                            &mut self.session,
                            src_account_id,
                            creator,
                            GrantablePermission::TransferMyAssets,
                        )
                        .map_err(|e| wrap(name, e))?
                    };
                    if !allowed {
                        return Err(denied(name, "missing transfer permission"));
                    }
                    let dest_permissions =
                        query::get_account_permissions(&mut self.session, dest_account_id)
                            .map_err(|e| wrap(name, e))?;
                    if !dest_permissions.contains(RolePermission::Receive)
                        && !dest_permissions.contains(RolePermission::Root)
                    {
                        return Err(denied(name, "destination cannot receive"));
                    }
                }
                self.transfer(name, src_account_id, dest_account_id, asset_id, amount)
            }
            Command::SetSettingValue { key, value } => {
                // settings are reserved for the root authority
                if validate {
                    return Err(denied(name, "missing root permission"));
                }
                wsv::set_setting_value(&mut self.session, key, value)
                    .map_err(|e| wrap(name, e))
            }
            Command::CallEngine { callee, input } => {
                if validate && !creator_permissions.contains(RolePermission::CallEngine) {
                    return Err(denied(name, "missing call_engine permission"));
                }
                let vm_caller = self.vm_caller.clone().ok_or_else(|| {
                    precondition(name, "no VM caller is wired".to_string())
                })?;
                vm_caller
                    .call(&mut self.session, creator, callee.as_deref(), input)
                    .map(|_| ())
                    .map_err(|e| precondition(name, e))
            }
        }
    }

    // role permission on any account, or a grantable permission delegated by
    // the target
    fn allowed_on_account(
        &mut self,
        creator: &AccountId,
        target: &AccountId,
        creator_permissions: &PermissionSet,
        role_permission: RolePermission,
        grantable: GrantablePermission,
    ) -> Result<bool, StorageError> {
        if creator_permissions.contains(role_permission) {
            return Ok(true);
        }
        query::has_grantable_permission(&mut self.session, target, creator, grantable)
    }

    fn add_to_balance(
        &mut self,
        name: &'static str,
        account_id: &AccountId,
        asset_id: &AssetId,
        amount: &Amount,
    ) -> Result<(), CommandError> {
        let precision = self.asset_precision(name, asset_id)?;
        if amount.precision() != precision {
            return Err(precondition(
                name,
                format!(
                    "amount precision {} does not match asset precision {}",
                    amount.precision(),
                    precision
                ),
            ));
        }
        let current = query::get_account_asset(&mut self.session, account_id, asset_id)
            .map_err(|e| wrap(name, e))?
            .unwrap_or_else(|| Amount::zero(precision));
        let updated = current.checked_add(amount).map_err(|e| match e {
            AmountError::Overflow => CommandError {
                command_name: name,
                error_code: error_code::OVERFLOW,
                error_extra: "balance exceeds the 256-bit limit".to_string(),
            },
            other => precondition(name, other.to_string()),
        })?;
        wsv::set_account_asset(&mut self.session, account_id, asset_id, &updated)
            .map_err(|e| wrap(name, e))
    }

    fn subtract_from_balance(
        &mut self,
        name: &'static str,
        account_id: &AccountId,
        asset_id: &AssetId,
        amount: &Amount,
    ) -> Result<(), CommandError> {
        let precision = self.asset_precision(name, asset_id)?;
        if amount.precision() != precision {
            return Err(precondition(
                name,
                format!(
                    "amount precision {} does not match asset precision {}",
                    amount.precision(),
                    precision
                ),
            ));
        }
        let current = query::get_account_asset(&mut self.session, account_id, asset_id)
            .map_err(|e| wrap(name, e))?
            .unwrap_or_else(|| Amount::zero(precision));
        let updated = current.checked_sub(amount).map_err(|_| CommandError {
            command_name: name,
            error_code: error_code::INSUFFICIENT_BALANCE,
            error_extra: format!("balance {} is less than {}", current, amount),
        })?;
        wsv::set_account_asset(&mut self.session, account_id, asset_id, &updated)
            .map_err(|e| wrap(name, e))
    }

    fn transfer(
        &mut self,
        name: &'static str,
        src: &AccountId,
        dest: &AccountId,
        asset_id: &AssetId,
        amount: &Amount,
    ) -> Result<(), CommandError> {
        for account in [src, dest] {
            if query::get_account_quorum(&mut self.session, account)
                .map_err(|e| wrap(name, e))?
                .is_none()
            {
                return Err(CommandError {
                    command_name: name,
                    error_code: error_code::NOT_FOUND,
                    error_extra: format!("account {} not found", account),
                });
            }
        }

        let precision = self.asset_precision(name, asset_id)?;
        if amount.precision() != precision {
            return Err(precondition(
                name,
                format!(
                    "amount precision {} does not match asset precision {}",
                    amount.precision(),
                    precision
                ),
            ));
        }

        let src_balance = query::get_account_asset(&mut self.session, src, asset_id)
            .map_err(|e| wrap(name, e))?
            .unwrap_or_else(|| Amount::zero(precision));
        let src_updated = src_balance.checked_sub(amount).map_err(|_| CommandError {
            command_name: name,
            error_code: error_code::INSUFFICIENT_BALANCE,
            error_extra: format!("balance {} is less than {}", src_balance, amount),
        })?;

        let dest_balance = query::get_account_asset(&mut self.session, dest, asset_id)
            .map_err(|e| wrap(name, e))?
            .unwrap_or_else(|| Amount::zero(precision));
        let dest_updated = dest_balance.checked_add(amount).map_err(|_| CommandError {
            command_name: name,
            error_code: error_code::OVERFLOW,
            error_extra: "destination balance exceeds the 256-bit limit".to_string(),
        })?;

        wsv::set_account_asset(&mut self.session, src, asset_id, &src_updated)
            .map_err(|e| wrap(name, e))?;
        wsv::set_account_asset(&mut self.session, dest, asset_id, &dest_updated)
            .map_err(|e| wrap(name, e))
    }

    fn remove_peer(
        &mut self,
        name: &'static str,
        public_key: &takara_common::crypto::PublicKey,
    ) -> Result<(), CommandError> {
        let peer = query::get_peer(&mut self.session, public_key)
            .map_err(|e| wrap(name, e))?
            .ok_or_else(|| CommandError {
                command_name: name,
                error_code: error_code::NOT_FOUND,
                error_extra: format!("peer {} not found", public_key),
            })?;
        if !peer.syncing {
            let remaining = query::get_peers(&mut self.session, false)
                .map_err(|e| wrap(name, e))?
                .len();
            if remaining <= 1 {
                return Err(precondition(
                    name,
                    "cannot remove the last consensus peer".to_string(),
                ));
            }
        }
        wsv::remove_peer(&mut self.session, public_key).map_err(|e| wrap(name, e))
    }

    fn remove_signatory(
        &mut self,
        name: &'static str,
        account_id: &AccountId,
        public_key: &takara_common::crypto::PublicKey,
    ) -> Result<(), CommandError> {
        let quorum = query::get_account_quorum(&mut self.session, account_id)
            .map_err(|e| wrap(name, e))?
            .ok_or_else(|| CommandError {
                command_name: name,
                error_code: error_code::NOT_FOUND,
                error_extra: format!("account {} not found", account_id),
            })?;
        let signatories = query::get_signatories(&mut self.session, account_id)
            .map_err(|e| wrap(name, e))?;
        if signatories.len() <= quorum as usize {
            return Err(precondition(
                name,
                format!(
                    "removing a signatory would leave {} below quorum {}",
                    signatories.len() - 1,
                    quorum
                ),
            ));
        }
        wsv::remove_signatory(&mut self.session, account_id, public_key)
            .map_err(|e| wrap(name, e))
    }

    fn set_quorum(
        &mut self,
        name: &'static str,
        account_id: &AccountId,
        quorum: u16,
    ) -> Result<(), CommandError> {
        let signatories = query::get_signatories(&mut self.session, account_id)
            .map_err(|e| wrap(name, e))?;
        if quorum == 0 || quorum as usize > signatories.len() {
            return Err(precondition(
                name,
                format!(
                    "quorum {} out of range [1, {}]",
                    quorum,
                    signatories.len()
                ),
            ));
        }
        wsv::set_quorum(&mut self.session, account_id, quorum).map_err(|e| wrap(name, e))
    }

    #[allow(clippy::too_many_arguments)]
    fn compare_and_set_detail(
        &mut self,
        name: &'static str,
        creator: &AccountId,
        account_id: &AccountId,
        key: &str,
        value: &str,
        old_value: Option<&str>,
        check_empty: bool,
    ) -> Result<(), CommandError> {
        let current = query::get_account_detail(&mut self.session, account_id, creator, key)
            .map_err(|e| wrap(name, e))?;

        let matches = match (old_value, current.as_deref()) {
            (Some(expected), Some(current)) => expected == current,
            (Some(_), None) => !check_empty,
            (None, Some(_)) => !check_empty,
            (None, None) => true,
        };
        if !matches {
            return Err(precondition(
                name,
                format!("current value of {} does not match the expectation", key),
            ));
        }
        wsv::set_account_detail(&mut self.session, account_id, creator, key, value)
            .map_err(|e| wrap(name, e))
    }

    fn asset_precision(
        &mut self,
        name: &'static str,
        asset_id: &AssetId,
    ) -> Result<u8, CommandError> {
        query::get_asset_precision(&mut self.session, asset_id)
            .map_err(|e| wrap(name, e))?
            .ok_or_else(|| CommandError {
                command_name: name,
                error_code: error_code::NOT_FOUND,
                error_extra: format!("asset {} not found", asset_id),
            })
    }
}

fn wrap(name: &'static str, error: StorageError) -> CommandError {
    let error_code = match &error {
        StorageError::NotFound(_) => error_code::NOT_FOUND,
        StorageError::AlreadyExists(_) => error_code::ALREADY_EXISTS,
        StorageError::PermissionDenied(_) => error_code::PERMISSION_DENIED,
        StorageError::PreconditionFailed(_) => error_code::PRECONDITION_FAILED,
        StorageError::ArithmeticOverflow => error_code::OVERFLOW,
        _ => error_code::INTERNAL,
    };
    CommandError {
        command_name: name,
        error_code,
        error_extra: error.to_string(),
    }
}

fn denied(name: &'static str, detail: &str) -> CommandError {
    CommandError {
        command_name: name,
        error_code: error_code::PERMISSION_DENIED,
        error_extra: detail.to_string(),
    }
}

fn precondition(name: &'static str, detail: String) -> CommandError {
    CommandError {
        command_name: name,
        error_code: error_code::PRECONDITION_FAILED,
        error_extra: detail,
    }
}
