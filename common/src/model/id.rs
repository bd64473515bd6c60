//! Ledger identifiers: `name@domain` accounts, `name#domain` assets,
//! plain domain and role names.
//!
//! The character set is restricted to what the state keyspace accepts, so
//! identifiers can be embedded in key paths without any escaping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

const MAX_NAME_LENGTH: usize = 32;
const MAX_DOMAIN_LENGTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Empty identifier")]
    Empty,

    #[error("Identifier too long: {0}")]
    TooLong(String),

    #[error("Invalid character {1:?} in identifier {0}")]
    InvalidCharacter(String, char),

    #[error("Malformed identifier: {0}")]
    Malformed(String),
}

fn check_name(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(IdError::TooLong(value.to_string()));
    }
    for c in value.chars() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(IdError::InvalidCharacter(value.to_string(), c));
        }
    }
    Ok(())
}

fn check_domain(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.len() > MAX_DOMAIN_LENGTH {
        return Err(IdError::TooLong(value.to_string()));
    }
    for c in value.chars() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' || c == '.') {
            return Err(IdError::InvalidCharacter(value.to_string(), c));
        }
    }
    Ok(())
}

macro_rules! string_id {
    ($name:ident, $check:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                $check(&value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl Serializer for $name {
            fn write(&self, writer: &mut Writer) {
                writer.write_string(&self.0);
            }

            fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
                Self::new(reader.read_string()?).map_err(|_| ReaderError::InvalidValue)
            }

            fn size(&self) -> usize {
                2 + self.0.len()
            }
        }
    };
}

string_id!(DomainId, check_domain);
string_id!(RoleId, check_name);

macro_rules! scoped_id {
    ($name:ident, $separator:literal) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name {
            name: String,
            domain: DomainId,
        }

        impl $name {
            pub fn new(name: impl Into<String>, domain: DomainId) -> Result<Self, IdError> {
                let name = name.into();
                check_name(&name)?;
                Ok(Self { name, domain })
            }

            pub fn name(&self) -> &str {
                &self.name
            }

            pub fn domain(&self) -> &DomainId {
                &self.domain
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (name, domain) = s
                    .split_once($separator)
                    .ok_or_else(|| IdError::Malformed(s.to_string()))?;
                Self::new(name, domain.parse()?)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}{}", self.name, $separator, self.domain)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serializer for $name {
            fn write(&self, writer: &mut Writer) {
                writer.write_string(&self.to_string());
            }

            fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
                reader
                    .read_string()?
                    .parse()
                    .map_err(|_| ReaderError::InvalidValue)
            }

            fn size(&self) -> usize {
                2 + self.name.len() + 1 + self.domain.as_str().len()
            }
        }
    };
}

scoped_id!(AccountId, '@');
scoped_id!(AssetId, '#');

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parsing() {
        let id: AccountId = "alice@wonderland".parse().unwrap();
        assert_eq!(id.name(), "alice");
        assert_eq!(id.domain().as_str(), "wonderland");
        assert_eq!(id.to_string(), "alice@wonderland");

        assert!("alice".parse::<AccountId>().is_err());
        assert!("Alice@wonderland".parse::<AccountId>().is_err());
        assert!("alice@".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_asset_id_parsing() {
        let id: AssetId = "coin#wonderland".parse().unwrap();
        assert_eq!(id.name(), "coin");
        assert_eq!(id.to_string(), "coin#wonderland");
        assert!("coin@wonderland".parse::<AssetId>().is_err());
    }

    #[test]
    fn test_id_charset() {
        assert!(RoleId::new("admin_role").is_ok());
        assert!(RoleId::new("admin role").is_err());
        assert!(DomainId::new("test-domain.io").is_ok());
        assert!(DomainId::new("bad/domain").is_err());
    }

    #[test]
    fn test_serializer_roundtrip() {
        let id: AccountId = "bob@market".parse().unwrap();
        use crate::serializer::Serializer;
        assert_eq!(AccountId::from_bytes(&id.to_bytes()).unwrap(), id);
    }
}
