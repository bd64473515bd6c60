//! Fixed-precision asset amounts backed by a 256-bit unsigned integer.
//!
//! `"123.45"` parses to value `12345` with precision `2`. Arithmetic is only
//! defined between amounts of equal precision and saturates nowhere: any
//! overflow of the 256-bit value space is reported to the caller.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Malformed amount: {0}")]
    Malformed(String),

    #[error("Amount precision mismatch: {0} vs {1}")]
    PrecisionMismatch(u8, u8),

    #[error("Amount overflow")]
    Overflow,

    #[error("Amount underflow")]
    Underflow,
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    value: U256,
    precision: u8,
}

impl Amount {
    pub fn new(value: U256, precision: u8) -> Self {
        Self { value, precision }
    }

    pub fn zero(precision: u8) -> Self {
        Self {
            value: U256::zero(),
            precision,
        }
    }

    /// Largest representable amount at the given precision.
    pub fn max(precision: u8) -> Self {
        Self {
            value: U256::MAX,
            precision,
        }
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        if self.precision != other.precision {
            return Err(AmountError::PrecisionMismatch(
                self.precision,
                other.precision,
            ));
        }
        let value = self
            .value
            .checked_add(other.value)
            .ok_or(AmountError::Overflow)?;
        Ok(Amount::new(value, self.precision))
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, AmountError> {
        if self.precision != other.precision {
            return Err(AmountError::PrecisionMismatch(
                self.precision,
                other.precision,
            ));
        }
        let value = self
            .value
            .checked_sub(other.value)
            .ok_or(AmountError::Underflow)?;
        Ok(Amount::new(value, self.precision))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AmountError::Malformed(s.to_string());

        let (digits, precision) = match s.split_once('.') {
            Some((integer, fraction)) => {
                if integer.is_empty() || fraction.is_empty() || fraction.len() > u8::MAX as usize {
                    return Err(malformed());
                }
                (format!("{}{}", integer, fraction), fraction.len() as u8)
            }
            None => (s.to_string(), 0),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let value = U256::from_dec_str(&digits).map_err(|_| malformed())?;
        Ok(Amount::new(value, precision))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.value.to_string();
        if self.precision == 0 {
            return write!(f, "{}", digits);
        }

        let precision = self.precision as usize;
        let padded = if digits.len() <= precision {
            format!("{:0>width$}", digits, width = precision + 1)
        } else {
            digits
        };
        let (integer, fraction) = padded.split_at(padded.len() - precision);
        write!(f, "{}.{}", integer, fraction)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

impl Serializer for Amount {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.value.to_big_endian());
        writer.write_u8(self.precision);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let bytes = reader.read_bytes(32)?;
        let value = U256::from_big_endian(&bytes);
        let precision = reader.read_u8()?;
        Ok(Amount::new(value, precision))
    }

    fn size(&self) -> usize {
        32 + 1
    }
}
