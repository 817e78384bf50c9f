//! Canonical claims encoding shared by [`crate::card::Card`],
//! [`crate::credential::Credential`], and [`crate::vouch::Vouch`].
//!
//! Claim values are Unicode-NFC normalized. Insertion order is preserved on
//! the map itself (claims round-trip and display the way they were built),
//! but [`Claims::canonical_bytes`] re-sorts keys before CBOR-encoding so two
//! identical claim sets always produce the same bytes regardless of
//! insertion order, which is what the detached signature actually covers.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use unicode_normalization::UnicodeNormalization;

use crate::error::ObjectError;

/// An order-preserving map of string claims, normalized on insert.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Claims(IndexMap<String, String>);

/// Always serializes with keys in sorted order, regardless of insertion
/// order, so embedding `Claims` directly in a CBOR-encoded struct (as the
/// identity objects' unsigned forms do) still canonicalizes.
impl Serialize for Claims {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sorted: BTreeMap<&String, &String> = self.0.iter().collect();
        sorted.serialize(serializer)
    }
}

impl Claims {
    pub fn new() -> Self {
        Claims(IndexMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let normalized: String = value.as_ref().nfc().collect();
        self.0.insert(key.into(), normalized);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates claims in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic CBOR encoding via [`Claims`]'s own sorted `Serialize`
    /// impl, so the signed bytes don't depend on the order claims were
    /// inserted.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ObjectError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ObjectError::Encoding(e.to_string()))?;
        Ok(buf)
    }
}

impl FromIterator<(String, String)> for Claims {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut claims = Claims::new();
        for (k, v) in iter {
            claims.insert(k, v);
        }
        claims
    }
}
