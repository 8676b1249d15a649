use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

const MYSELF_CASH: &str = "myself-cash";
const MYSELF_BANK: &str = "myself-bank";

/// Stable identifier of a party.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyId(String);

impl PartyId {
    pub fn new(raw: impl Into<String>) -> CoreResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidPartyId(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Reserved id of the business's cash drawer.
    pub fn myself_cash() -> Self {
        Self(MYSELF_CASH.to_string())
    }

    /// Reserved id of the business's bank account.
    pub fn myself_bank() -> Self {
        Self(MYSELF_BANK.to_string())
    }

    /// Whether this id names one of the two system accounts.
    pub fn is_system(&self) -> bool {
        self.0 == MYSELF_CASH || self.0 == MYSELF_BANK
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PartyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PartyId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartyId> for String {
    fn from(value: PartyId) -> Self {
        value.0
    }
}

/// Directory a party belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Customer,
    Supplier,
    Middleman,
    System,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyRole::Customer => "customer",
            PartyRole::Supplier => "supplier",
            PartyRole::Middleman => "middleman",
            PartyRole::System => "system",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(PartyRole::Customer),
            "supplier" => Ok(PartyRole::Supplier),
            "middleman" => Ok(PartyRole::Middleman),
            "system" => Ok(PartyRole::System),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// Any account that can give or receive money.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub name: String,
    pub role: PartyRole,
}

impl Party {
    pub fn new(id: PartyId, name: impl Into<String>, role: PartyRole) -> Self {
        Self {
            id,
            name: name.into(),
            role,
        }
    }

    pub fn myself_cash() -> Self {
        Self::new(PartyId::myself_cash(), "Myself-Cash", PartyRole::System)
    }

    pub fn myself_bank() -> Self {
        Self::new(PartyId::myself_bank(), "Myself-Bank", PartyRole::System)
    }

    pub fn is_system(&self) -> bool {
        self.id.is_system()
    }

    /// Id/name pair denormalised onto transaction records.
    pub fn to_ref(&self) -> PartyRef {
        PartyRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Party id and display name as captured on a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRef {
    pub id: PartyId,
    pub name: String,
}
