//! Ledger commands, the only way to mutate the world state.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::crypto::PublicKey;
use crate::model::{AccountId, AssetId, DomainId, Peer, RoleId};
use crate::permission::{GrantablePermission, PermissionSet};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    AddAssetQuantity {
        asset_id: AssetId,
        amount: Amount,
    },
    AddPeer {
        peer: Peer,
    },
    AddSignatory {
        account_id: AccountId,
        public_key: PublicKey,
    },
    AppendRole {
        account_id: AccountId,
        role_id: RoleId,
    },
    CallEngine {
        callee: Option<String>,
        input: Vec<u8>,
    },
    CompareAndSetAccountDetail {
        account_id: AccountId,
        key: String,
        value: String,
        old_value: Option<String>,
        check_empty: bool,
    },
    CreateAccount {
        account_name: String,
        domain_id: DomainId,
        public_key: PublicKey,
    },
    CreateAsset {
        asset_name: String,
        domain_id: DomainId,
        precision: u8,
    },
    CreateDomain {
        domain_id: DomainId,
        default_role: RoleId,
    },
    CreateRole {
        role_id: RoleId,
        permissions: PermissionSet,
    },
    DetachRole {
        account_id: AccountId,
        role_id: RoleId,
    },
    GrantPermission {
        account_id: AccountId,
        permission: GrantablePermission,
    },
    RemovePeer {
        public_key: PublicKey,
    },
    RemoveSignatory {
        account_id: AccountId,
        public_key: PublicKey,
    },
    RevokePermission {
        account_id: AccountId,
        permission: GrantablePermission,
    },
    SetAccountDetail {
        account_id: AccountId,
        key: String,
        value: String,
    },
    SetQuorum {
        account_id: AccountId,
        quorum: u16,
    },
    SubtractAssetQuantity {
        asset_id: AssetId,
        amount: Amount,
    },
    TransferAsset {
        src_account_id: AccountId,
        dest_account_id: AccountId,
        asset_id: AssetId,
        description: String,
        amount: Amount,
    },
    SetSettingValue {
        key: String,
        value: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddAssetQuantity { .. } => "AddAssetQuantity",
            Command::AddPeer { .. } => "AddPeer",
            Command::AddSignatory { .. } => "AddSignatory",
            Command::AppendRole { .. } => "AppendRole",
            Command::CallEngine { .. } => "CallEngine",
            Command::CompareAndSetAccountDetail { .. } => "CompareAndSetAccountDetail",
            Command::CreateAccount { .. } => "CreateAccount",
            Command::CreateAsset { .. } => "CreateAsset",
            Command::CreateDomain { .. } => "CreateDomain",
            Command::CreateRole { .. } => "CreateRole",
            Command::DetachRole { .. } => "DetachRole",
            Command::GrantPermission { .. } => "GrantPermission",
            Command::RemovePeer { .. } => "RemovePeer",
            Command::RemoveSignatory { .. } => "RemoveSignatory",
            Command::RevokePermission { .. } => "RevokePermission",
            Command::SetAccountDetail { .. } => "SetAccountDetail",
            Command::SetQuorum { .. } => "SetQuorum",
            Command::SubtractAssetQuantity { .. } => "SubtractAssetQuantity",
            Command::TransferAsset { .. } => "TransferAsset",
            Command::SetSettingValue { .. } => "SetSettingValue",
        }
    }
}

// Wire tags, append-only.
const TAG_ADD_ASSET_QUANTITY: u8 = 0;
const TAG_ADD_PEER: u8 = 1;
const TAG_ADD_SIGNATORY: u8 = 2;
const TAG_APPEND_ROLE: u8 = 3;
const TAG_CALL_ENGINE: u8 = 4;
const TAG_COMPARE_AND_SET_ACCOUNT_DETAIL: u8 = 5;
const TAG_CREATE_ACCOUNT: u8 = 6;
const TAG_CREATE_ASSET: u8 = 7;
const TAG_CREATE_DOMAIN: u8 = 8;
const TAG_CREATE_ROLE: u8 = 9;
const TAG_DETACH_ROLE: u8 = 10;
const TAG_GRANT_PERMISSION: u8 = 11;
const TAG_REMOVE_PEER: u8 = 12;
const TAG_REMOVE_SIGNATORY: u8 = 13;
const TAG_REVOKE_PERMISSION: u8 = 14;
const TAG_SET_ACCOUNT_DETAIL: u8 = 15;
const TAG_SET_QUORUM: u8 = 16;
const TAG_SUBTRACT_ASSET_QUANTITY: u8 = 17;
const TAG_TRANSFER_ASSET: u8 = 18;
const TAG_SET_SETTING_VALUE: u8 = 19;

impl Serializer for Command {
    fn write(&self, writer: &mut Writer) {
        match self {
            Command::AddAssetQuantity { asset_id, amount } => {
                writer.write_u8(TAG_ADD_ASSET_QUANTITY);
                asset_id.write(writer);
                amount.write(writer);
            }
            Command::AddPeer { peer } => {
                writer.write_u8(TAG_ADD_PEER);
                peer.write(writer);
            }
            Command::AddSignatory {
                account_id,
                public_key,
            } => {
                writer.write_u8(TAG_ADD_SIGNATORY);
                account_id.write(writer);
                public_key.write(writer);
            }
            Command::AppendRole {
                account_id,
                role_id,
            } => {
                writer.write_u8(TAG_APPEND_ROLE);
                account_id.write(writer);
                role_id.write(writer);
            }
            Command::CallEngine { callee, input } => {
                writer.write_u8(TAG_CALL_ENGINE);
                callee.write(writer);
                input.write(writer);
            }
            Command::CompareAndSetAccountDetail {
                account_id,
                key,
                value,
                old_value,
                check_empty,
            } => {
                writer.write_u8(TAG_COMPARE_AND_SET_ACCOUNT_DETAIL);
                account_id.write(writer);
                writer.write_string(key);
                writer.write_string(value);
                old_value.write(writer);
                writer.write_bool(*check_empty);
            }
            Command::CreateAccount {
                account_name,
                domain_id,
                public_key,
            } => {
                writer.write_u8(TAG_CREATE_ACCOUNT);
                writer.write_string(account_name);
                domain_id.write(writer);
                public_key.write(writer);
            }
            Command::CreateAsset {
                asset_name,
                domain_id,
                precision,
            } => {
                writer.write_u8(TAG_CREATE_ASSET);
                writer.write_string(asset_name);
                domain_id.write(writer);
                writer.write_u8(*precision);
            }
            Command::CreateDomain {
                domain_id,
                default_role,
            } => {
                writer.write_u8(TAG_CREATE_DOMAIN);
                domain_id.write(writer);
                default_role.write(writer);
            }
            Command::CreateRole {
                role_id,
                permissions,
            } => {
                writer.write_u8(TAG_CREATE_ROLE);
                role_id.write(writer);
                permissions.write(writer);
            }
            Command::DetachRole {
                account_id,
                role_id,
            } => {
                writer.write_u8(TAG_DETACH_ROLE);
                account_id.write(writer);
                role_id.write(writer);
            }
            Command::GrantPermission {
                account_id,
                permission,
            } => {
                writer.write_u8(TAG_GRANT_PERMISSION);
                account_id.write(writer);
                permission.write(writer);
            }
            Command::RemovePeer { public_key } => {
                writer.write_u8(TAG_REMOVE_PEER);
                public_key.write(writer);
            }
            Command::RemoveSignatory {
                account_id,
                public_key,
            } => {
                writer.write_u8(TAG_REMOVE_SIGNATORY);
                account_id.write(writer);
                public_key.write(writer);
            }
            Command::RevokePermission {
                account_id,
                permission,
            } => {
                writer.write_u8(TAG_REVOKE_PERMISSION);
                account_id.write(writer);
                permission.write(writer);
            }
            Command::SetAccountDetail {
                account_id,
                key,
                value,
            } => {
                writer.write_u8(TAG_SET_ACCOUNT_DETAIL);
                account_id.write(writer);
                writer.write_string(key);
                writer.write_string(value);
            }
            Command::SetQuorum {
                account_id,
                quorum,
            } => {
                writer.write_u8(TAG_SET_QUORUM);
                account_id.write(writer);
                writer.write_u16(*quorum);
            }
            Command::SubtractAssetQuantity { asset_id, amount } => {
                writer.write_u8(TAG_SUBTRACT_ASSET_QUANTITY);
                asset_id.write(writer);
                amount.write(writer);
            }
            Command::TransferAsset {
                src_account_id,
                dest_account_id,
                asset_id,
                description,
                amount,
            } => {
                writer.write_u8(TAG_TRANSFER_ASSET);
                src_account_id.write(writer);
                dest_account_id.write(writer);
                asset_id.write(writer);
                writer.write_string(description);
                amount.write(writer);
            }
            Command::SetSettingValue { key, value } => {
                writer.write_u8(TAG_SET_SETTING_VALUE);
                writer.write_string(key);
                writer.write_string(value);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            TAG_ADD_ASSET_QUANTITY => Command::AddAssetQuantity {
                asset_id: AssetId::read(reader)?,
                amount: Amount::read(reader)?,
            },
            TAG_ADD_PEER => Command::AddPeer {
                peer: Peer::read(reader)?,
            },
            TAG_ADD_SIGNATORY => Command::AddSignatory {
                account_id: AccountId::read(reader)?,
                public_key: PublicKey::read(reader)?,
            },
            TAG_APPEND_ROLE => Command::AppendRole {
                account_id: AccountId::read(reader)?,
                role_id: RoleId::read(reader)?,
            },
            TAG_CALL_ENGINE => Command::CallEngine {
                callee: Option::read(reader)?,
                input: Vec::read(reader)?,
            },
            TAG_COMPARE_AND_SET_ACCOUNT_DETAIL => Command::CompareAndSetAccountDetail {
                account_id: AccountId::read(reader)?,
                key: reader.read_string()?,
                value: reader.read_string()?,
                old_value: Option::read(reader)?,
                check_empty: reader.read_bool()?,
            },
            TAG_CREATE_ACCOUNT => Command::CreateAccount {
                account_name: reader.read_string()?,
                domain_id: DomainId::read(reader)?,
                public_key: PublicKey::read(reader)?,
            },
            TAG_CREATE_ASSET => Command::CreateAsset {
                asset_name: reader.read_string()?,
                domain_id: DomainId::read(reader)?,
                precision: reader.read_u8()?,
            },
            TAG_CREATE_DOMAIN => Command::CreateDomain {
                domain_id: DomainId::read(reader)?,
                default_role: RoleId::read(reader)?,
            },
            TAG_CREATE_ROLE => Command::CreateRole {
                role_id: RoleId::read(reader)?,
                permissions: PermissionSet::read(reader)?,
            },
            TAG_DETACH_ROLE => Command::DetachRole {
                account_id: AccountId::read(reader)?,
                role_id: RoleId::read(reader)?,
            },
            TAG_GRANT_PERMISSION => Command::GrantPermission {
                account_id: AccountId::read(reader)?,
                permission: GrantablePermission::read(reader)?,
            },
            TAG_REMOVE_PEER => Command::RemovePeer {
                public_key: PublicKey::read(reader)?,
            },
            TAG_REMOVE_SIGNATORY => Command::RemoveSignatory {
                account_id: AccountId::read(reader)?,
                public_key: PublicKey::read(reader)?,
            },
            TAG_REVOKE_PERMISSION => Command::RevokePermission {
                account_id: AccountId::read(reader)?,
                permission: GrantablePermission::read(reader)?,
            },
            TAG_SET_ACCOUNT_DETAIL => Command::SetAccountDetail {
                account_id: AccountId::read(reader)?,
                key: reader.read_string()?,
                value: reader.read_string()?,
            },
            TAG_SET_QUORUM => Command::SetQuorum {
                account_id: AccountId::read(reader)?,
                quorum: reader.read_u16()?,
            },
            TAG_SUBTRACT_ASSET_QUANTITY => Command::SubtractAssetQuantity {
                asset_id: AssetId::read(reader)?,
                amount: Amount::read(reader)?,
            },
            TAG_TRANSFER_ASSET => Command::TransferAsset {
                src_account_id: AccountId::read(reader)?,
                dest_account_id: AccountId::read(reader)?,
                asset_id: AssetId::read(reader)?,
                description: reader.read_string()?,
                amount: Amount::read(reader)?,
            },
            TAG_SET_SETTING_VALUE => Command::SetSettingValue {
                key: reader.read_string()?,
                value: reader.read_string()?,
            },
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1 + match self {
            Command::AddAssetQuantity { asset_id, amount } => asset_id.size() + amount.size(),
            Command::AddPeer { peer } => peer.size(),
            Command::AddSignatory {
                account_id,
                public_key,
            } => account_id.size() + public_key.size(),
            Command::AppendRole {
                account_id,
                role_id,
            } => account_id.size() + role_id.size(),
            Command::CallEngine { callee, input } => callee.size() + input.size(),
            Command::CompareAndSetAccountDetail {
                account_id,
                key,
                value,
                old_value,
                ..
            } => account_id.size() + key.size() + value.size() + old_value.size() + 1,
            Command::CreateAccount {
                account_name,
                domain_id,
                public_key,
            } => account_name.size() + domain_id.size() + public_key.size(),
            Command::CreateAsset {
                asset_name,
                domain_id,
                ..
            } => asset_name.size() + domain_id.size() + 1,
            Command::CreateDomain {
                domain_id,
                default_role,
            } => domain_id.size() + default_role.size(),
            Command::CreateRole {
                role_id,
                permissions,
            } => role_id.size() + permissions.size(),
            Command::DetachRole {
                account_id,
                role_id,
            } => account_id.size() + role_id.size(),
            Command::GrantPermission {
                account_id,
                permission,
            } => account_id.size() + permission.size(),
            Command::RemovePeer { public_key } => public_key.size(),
            Command::RemoveSignatory {
                account_id,
                public_key,
            } => account_id.size() + public_key.size(),
            Command::RevokePermission {
                account_id,
                permission,
            } => account_id.size() + permission.size(),
            Command::SetAccountDetail {
                account_id,
                key,
                value,
            } => account_id.size() + key.size() + value.size(),
            Command::SetQuorum { account_id, .. } => account_id.size() + 2,
            Command::SubtractAssetQuantity { asset_id, amount } => {
                asset_id.size() + amount.size()
            }
            Command::TransferAsset {
                src_account_id,
                dest_account_id,
                asset_id,
                description,
                amount,
            } => {
                src_account_id.size()
                    + dest_account_id.size()
                    + asset_id.size()
                    + description.size()
                    + amount.size()
            }
            Command::SetSettingValue { key, value } => key.size() + value.size(),
        }
    }
}
