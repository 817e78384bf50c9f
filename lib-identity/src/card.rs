//! A `Card` is a subject's self-issued identity profile: a set of claims
//! about themselves, signed with their own key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::Claims;
use crate::error::ObjectError;
use crate::id::Id;
use crate::identity::{Identity, NodeIdentity};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub subject: Id,
    pub claims: Claims,
    pub issued_at: DateTime<Utc>,
    pub signature: [u8; 64],
}

impl Card {
    /// Builds and signs a card for `identity`'s own claims.
    pub fn create(identity: &NodeIdentity, claims: Claims) -> Result<Self, ObjectError> {
        let subject = identity.id();
        let issued_at = Utc::now();
        let unsigned = UnsignedCard {
            subject: &subject,
            claims: &claims,
            issued_at: &issued_at,
            signature: None,
        };
        let digest = unsigned.digest()?;
        let signature = identity.sign(&digest);

        Ok(Card {
            subject,
            claims,
            issued_at,
            signature,
        })
    }

    pub fn verify(&self, subject_public_key: &[u8; 32]) -> Result<(), ObjectError> {
        if self.subject != Id::from_hashed(subject_public_key) {
            return Err(ObjectError::InvalidSignature);
        }
        let unsigned = UnsignedCard {
            subject: &self.subject,
            claims: &self.claims,
            issued_at: &self.issued_at,
            signature: None,
        };
        let digest = unsigned.digest()?;
        lib_crypto::classical::ed25519::ed25519_verify(&digest, &self.signature, subject_public_key)
            .map_err(|_| ObjectError::InvalidSignature)
    }
}

/// The unsigned form of a [`Card`]: identical shape to the signed struct,
/// with `signature` fixed to `None`, CBOR-encoded and hashed to produce the
/// digest the subject signs.
#[derive(Serialize)]
struct UnsignedCard<'a> {
    subject: &'a Id,
    claims: &'a Claims,
    issued_at: &'a DateTime<Utc>,
    signature: Option<[u8; 64]>,
}

impl<'a> UnsignedCard<'a> {
    fn digest(&self) -> Result<[u8; 32], ObjectError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ObjectError::Encoding(e.to_string()))?;
        Ok(lib_crypto::sha256(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_verify_roundtrip() {
        let identity = NodeIdentity::generate();
        let mut claims = Claims::new();
        claims.insert("displayName", "Alice");

        let card = Card::create(&identity, claims).unwrap();
        card.verify(&identity.public_key()).unwrap();
    }

    #[test]
    fn tampered_claims_fail_verification() {
        let identity = NodeIdentity::generate();
        let mut claims = Claims::new();
        claims.insert("displayName", "Alice");
        let mut card = Card::create(&identity, claims).unwrap();

        card.claims.insert("displayName", "Mallory");
        assert!(card.verify(&identity.public_key()).is_err());
    }
}
