//! Identifiers, lifecycle status and fixed-point constants

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PortfolioError;

/// Basis-point denominator (10_000 bps = 100%)
pub const BPS: u64 = 10_000;

/// Seconds in a 365-day year
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// 32-byte account identifier, displayed and parsed as base58
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0; 32]);

    /// Address whose last byte is `seed`, everything else zero
    pub const fn from_seed(seed: u8) -> Self {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        Address(bytes)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}

impl FromStr for Address {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| PortfolioError::InvalidParams("address is not valid base58"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PortfolioError::InvalidParams("address must be 32 bytes"))?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Capabilities checked at operation boundaries
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Root of the role tree; administers every other role by default
    Admin,
    /// Portfolio manager: starts, deploys capital, reports receivables
    Manager,
    /// May pause and unpause guarded operations
    Pauser,
    /// May add vaults to the registry
    ListAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Pauser, Role::ListAdmin];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Pauser => "pauser",
            Role::ListAdmin => "list-admin",
        };
        f.write_str(name)
    }
}

/// Portfolio lifecycle. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    CapitalFormation,
    Live,
    Closed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::CapitalFormation => "capital-formation",
            Status::Live => "live",
            Status::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_base58_roundtrip() {
        let address = Address::from_seed(7);
        let parsed: Address = address.to_base58().parse().unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn test_address_rejects_short_input() {
        let short = bs58::encode([1u8; 20]).into_string();
        assert_eq!(
            short.parse::<Address>(),
            Err(PortfolioError::InvalidParams("address must be 32 bytes"))
        );
        assert!("0OIl".parse::<Address>().is_err());
    }

    #[test]
    fn test_status_ordering_follows_lifecycle() {
        assert!(Status::CapitalFormation < Status::Live);
        assert!(Status::Live < Status::Closed);
    }
}
