//! # Identity Types
//!
//! Thin newtypes over strings. They exist so that a beneficiary can never be
//! passed where an asset symbol was expected, and so that the "null
//! principal" has exactly one spelling.

use serde::{Deserialize, Serialize};

use crate::config::{ENGINE_ID_BYTES, ENGINE_ID_CONTEXT};

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// An account that can hold value, bid, own a registry, or receive proceeds.
///
/// Principals are opaque strings (typically hex-encoded public keys or
/// engine addresses). The empty string is the null principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Wraps an address string. Surrounding whitespace is dropped.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self(address.trim().to_string())
    }

    /// The null principal. Never a valid beneficiary.
    pub fn null() -> Self {
        Self(String::new())
    }

    /// Returns `true` for the null principal.
    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "<null>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Identifier of a value-transfer asset type (e.g. `USDC`).
///
/// Symbols are case-insensitive and stored upper-cased, the same way the
/// token factory normalizes ticker symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<AssetId> for String {
    fn from(a: AssetId) -> Self {
        a.0
    }
}

// ---------------------------------------------------------------------------
// EngineId
// ---------------------------------------------------------------------------

/// Identifier of a single auction engine.
///
/// An engine id doubles as the engine's own ledger account: escrowed bids
/// are held by `engine_id.as_principal()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(String);

impl EngineId {
    /// Derives a deterministic engine id from the creating registry, the
    /// creator, and the registry's creation nonce.
    ///
    /// `0x` followed by the first [`ENGINE_ID_BYTES`] bytes of a domain
    /// separated BLAKE3 hash, hex-encoded.
    pub fn derive(registry: &Principal, creator: &Principal, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(ENGINE_ID_CONTEXT);
        hasher.update(registry.as_str().as_bytes());
        hasher.update(&[0u8]);
        hasher.update(creator.as_str().as_bytes());
        hasher.update(&[0u8]);
        hasher.update(&nonce.to_be_bytes());
        let digest = hasher.finalize();
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[..ENGINE_ID_BYTES])))
    }

    /// Parses a `0x`-prefixed engine id. Returns `None` on anything that is
    /// not exactly [`ENGINE_ID_BYTES`] bytes of hex.
    pub fn parse(s: &str) -> Option<Self> {
        let body = s.trim().strip_prefix("0x")?;
        let bytes = hex::decode(body).ok()?;
        if bytes.len() != ENGINE_ID_BYTES {
            return None;
        }
        Some(Self(format!("0x{}", hex::encode(bytes))))
    }

    /// The ledger account that holds this engine's escrow.
    pub fn as_principal(&self) -> Principal {
        Principal::new(self.0.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
