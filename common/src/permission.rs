//! Role and grantable permissions.
//!
//! Role permissions gate commands issued on own or third-party state;
//! grantable permissions are delegated account-to-account and checked against
//! the target account's grant table. `Root` bypasses every check.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr};

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RolePermission {
    AddAssetQuantity = 0,
    SubtractAssetQuantity = 1,
    AddPeer = 2,
    RemovePeer = 3,
    AddSignatory = 4,
    RemoveSignatory = 5,
    SetQuorum = 6,
    CreateAccount = 7,
    CreateAsset = 8,
    CreateDomain = 9,
    CreateRole = 10,
    AppendRole = 11,
    DetachRole = 12,
    SetAccountDetail = 13,
    Transfer = 14,
    Receive = 15,
    CallEngine = 16,
    SetSettingValue = 17,
    GrantSetMyQuorum = 18,
    GrantAddMySignatory = 19,
    GrantRemoveMySignatory = 20,
    GrantSetMyAccountDetail = 21,
    GrantTransferMyAssets = 22,
    Root = 23,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GrantablePermission {
    SetMyQuorum = 0,
    AddMySignatory = 1,
    RemoveMySignatory = 2,
    SetMyAccountDetail = 3,
    TransferMyAssets = 4,
}

impl GrantablePermission {
    /// Role permission required to grant this permission to somebody else.
    pub fn required_to_grant(&self) -> RolePermission {
        match self {
            GrantablePermission::SetMyQuorum => RolePermission::GrantSetMyQuorum,
            GrantablePermission::AddMySignatory => RolePermission::GrantAddMySignatory,
            GrantablePermission::RemoveMySignatory => RolePermission::GrantRemoveMySignatory,
            GrantablePermission::SetMyAccountDetail => RolePermission::GrantSetMyAccountDetail,
            GrantablePermission::TransferMyAssets => RolePermission::GrantTransferMyAssets,
        }
    }
}

/// Bit set of [`RolePermission`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSet(u64);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        let mut set = Self::empty();
        for bit in 0..=RolePermission::Root as u8 {
            if let Some(permission) = RolePermission::from_repr(bit) {
                set.insert(permission);
            }
        }
        set
    }

    pub fn root() -> Self {
        let mut set = Self::empty();
        set.insert(RolePermission::Root);
        set
    }

    pub fn insert(&mut self, permission: RolePermission) {
        self.0 |= 1u64 << permission as u8;
    }

    pub fn remove(&mut self, permission: RolePermission) {
        self.0 &= !(1u64 << permission as u8);
    }

    pub fn contains(&self, permission: RolePermission) -> bool {
        self.0 & (1u64 << permission as u8) != 0
    }

    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet(self.0 | other.0)
    }

    pub fn contains_all(&self, other: &PermissionSet) -> bool {
        other.0 & !self.0 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = RolePermission> + '_ {
        (0..64u8).filter_map(RolePermission::from_repr).filter(|p| self.contains(*p))
    }
}

impl FromIterator<RolePermission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = RolePermission>>(iter: I) -> Self {
        let mut set = Self::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

impl Serializer for PermissionSet {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_u64()?))
    }

    fn size(&self) -> usize {
        8
    }
}

impl Serializer for GrantablePermission {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self as u8);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        GrantablePermission::from_repr(reader.read_u8()?).ok_or(ReaderError::InvalidValue)
    }

    fn size(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_set_operations() {
        let mut set = PermissionSet::empty();
        assert!(set.is_empty());
        set.insert(RolePermission::Transfer);
        set.insert(RolePermission::Receive);
        assert!(set.contains(RolePermission::Transfer));
        assert!(!set.contains(RolePermission::AddPeer));
        set.remove(RolePermission::Transfer);
        assert!(!set.contains(RolePermission::Transfer));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![RolePermission::Receive]);
    }

    #[test]
    fn test_all_contains_every_permission() {
        let all = PermissionSet::all();
        for permission in RolePermission::iter() {
            assert!(all.contains(permission), "{permission} missing");
        }
    }

    #[test]
    fn test_grant_mapping() {
        assert_eq!(
            GrantablePermission::TransferMyAssets.required_to_grant(),
            RolePermission::GrantTransferMyAssets
        );
    }

    #[test]
    fn test_names_are_snake_case() {
        assert_eq!(RolePermission::AddAssetQuantity.to_string(), "add_asset_quantity");
        assert_eq!(
            "transfer_my_assets".parse::<GrantablePermission>().unwrap(),
            GrantablePermission::TransferMyAssets
        );
    }
}
