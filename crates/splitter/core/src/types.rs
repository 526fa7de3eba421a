use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SplitterError;

/// Value in the smallest unit of an asset (wei, satoshis, cents ...).
pub type Amount = u128;

/// Integer share weight of a payee.
pub type Shares = u64;

/// Address-like identity: a payee, an admin, the splitter itself, or a
/// token contract.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The zero address. Never a valid payee or token contract.
    pub fn zero() -> Self {
        Self(String::new())
    }

    /// An empty identity, or one made only of zero digits (`0x000...`),
    /// counts as the zero address.
    pub fn is_zero(&self) -> bool {
        let trimmed = self.0.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        digits.chars().all(|c| c == '0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The asset a ledger tracks. Each asset has its own independent ledger.
///
/// Serialized as a plain string (`native` or `token:<contract>`) so it can
/// key JSON maps.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetId {
    /// The rail's native currency.
    Native,
    /// A fungible token identified by its contract.
    Token(AccountId),
}

impl AssetId {
    pub fn token(contract: impl Into<String>) -> Self {
        Self::Token(AccountId::new(contract))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, AssetId::Native)
    }

    pub fn token_contract(&self) -> Option<&AccountId> {
        match self {
            AssetId::Native => None,
            AssetId::Token(contract) => Some(contract),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => write!(f, "native"),
            AssetId::Token(contract) => write!(f, "token:{}", contract),
        }
    }
}

impl FromStr for AssetId {
    type Err = SplitterError;

    /// Accepts `native`, `token:<contract>`, or a bare contract identity.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("native") {
            return Ok(AssetId::Native);
        }
        let contract = s.strip_prefix("token:").unwrap_or(s);
        let contract = AccountId::new(contract);
        if contract.is_zero() {
            return Err(SplitterError::InvalidAsset(s.to_string()));
        }
        Ok(AssetId::Token(contract))
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One roster entry: a payee and its share weight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeShare {
    pub payee: AccountId,
    pub shares: Shares,
}

impl PayeeShare {
    pub fn new(payee: impl Into<String>, shares: Shares) -> Self {
        Self {
            payee: AccountId::new(payee),
            shares,
        }
    }

    /// Build roster entries from parallel payee/share arrays.
    pub fn zip(payees: Vec<AccountId>, shares: Vec<Shares>) -> Result<Vec<Self>, SplitterError> {
        if payees.len() != shares.len() {
            return Err(SplitterError::LengthMismatch {
                payees: payees.len(),
                shares: shares.len(),
            });
        }
        if payees.is_empty() {
            return Err(SplitterError::EmptyRoster);
        }
        Ok(payees
            .into_iter()
            .zip(shares)
            .map(|(payee, shares)| PayeeShare { payee, shares })
            .collect())
    }
}

impl fmt::Display for PayeeShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.payee, self.shares)
    }
}

/// Administrative actions guarded by the access gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    Pause,
    Unpause,
    Checkpoint,
    Reset,
    ManageVault,
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AdminAction::Pause => "pause",
            AdminAction::Unpause => "unpause",
            AdminAction::Checkpoint => "checkpoint",
            AdminAction::Reset => "reset",
            AdminAction::ManageVault => "manage vault",
        };
        f.write_str(label)
    }
}

/// Credit frozen for one payee on one asset by a checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditGrant {
    pub asset: AssetId,
    pub payee: AccountId,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_address_detection() {
        assert!(AccountId::zero().is_zero());
        assert!(AccountId::new("0x0000").is_zero());
        assert!(AccountId::new("0x").is_zero());
        assert!(!AccountId::new("0x01").is_zero());
        assert!(!AccountId::new("alice").is_zero());
    }

    #[test]
    fn asset_id_parses_and_displays() {
        assert_eq!("native".parse::<AssetId>().unwrap(), AssetId::Native);
        assert_eq!(
            "token:usdc".parse::<AssetId>().unwrap(),
            AssetId::token("usdc")
        );
        assert_eq!("usdc".parse::<AssetId>().unwrap(), AssetId::token("usdc"));
        assert_eq!(AssetId::token("usdc").to_string(), "token:usdc");
        assert!("token:0x00".parse::<AssetId>().is_err());
    }

    #[test]
    fn asset_id_keys_json_maps() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(AssetId::Native, 1u64);
        map.insert(AssetId::token("dai"), 2u64);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"token:dai\""));
        let restored: std::collections::BTreeMap<AssetId, u64> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(restored, map);
    }

    #[test]
    fn zip_rejects_mismatched_and_empty_arrays() {
        let payees = vec![AccountId::new("a"), AccountId::new("b")];
        assert_eq!(
            PayeeShare::zip(payees.clone(), vec![1]).unwrap_err(),
            SplitterError::LengthMismatch {
                payees: 2,
                shares: 1
            }
        );
        assert_eq!(
            PayeeShare::zip(vec![], vec![]).unwrap_err(),
            SplitterError::EmptyRoster
        );
        let entries = PayeeShare::zip(payees, vec![3, 1]).unwrap();
        assert_eq!(entries[0], PayeeShare::new("a", 3));
    }
}
