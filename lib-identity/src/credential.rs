//! A `Credential` is an issuer's signed attestation of claims about a
//! subject, e.g. "issuer X asserts subject Y's claims {role: admin}".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::Claims;
use crate::error::ObjectError;
use crate::id::Id;
use crate::identity::{Identity, NodeIdentity};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub id: Id,
    pub issuer: Id,
    pub subject: Id,
    pub claims: Claims,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub signature: [u8; 64],
}

impl Credential {
    pub fn issue(
        issuer: &NodeIdentity,
        subject: Id,
        claims: Claims,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ObjectError> {
        let issuer_id = issuer.id();
        let issued_at = Utc::now();
        let id = Id::from_hashed(
            &[
                issuer_id.as_bytes().as_slice(),
                subject.as_bytes().as_slice(),
                issued_at.to_rfc3339().as_bytes(),
            ]
            .concat(),
        );

        let unsigned = UnsignedCredential {
            id: &id,
            issuer: &issuer_id,
            subject: &subject,
            claims: &claims,
            issued_at: &issued_at,
            expires_at: &expires_at,
            signature: None,
        };
        let digest = unsigned.digest()?;
        let signature = issuer.sign(&digest);

        Ok(Credential {
            id,
            issuer: issuer_id,
            subject,
            claims,
            issued_at,
            expires_at,
            signature,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t < Utc::now())
    }

    pub fn verify(&self, issuer_public_key: &[u8; 32]) -> Result<(), ObjectError> {
        if self.issuer != Id::from_hashed(issuer_public_key) {
            return Err(ObjectError::InvalidSignature);
        }
        if self.is_expired() {
            return Err(ObjectError::Expired);
        }
        let unsigned = UnsignedCredential {
            id: &self.id,
            issuer: &self.issuer,
            subject: &self.subject,
            claims: &self.claims,
            issued_at: &self.issued_at,
            expires_at: &self.expires_at,
            signature: None,
        };
        let digest = unsigned.digest()?;
        lib_crypto::classical::ed25519::ed25519_verify(&digest, &self.signature, issuer_public_key)
            .map_err(|_| ObjectError::InvalidSignature)
    }
}

/// The unsigned form of a [`Credential`]: identical shape to the signed
/// struct, with `signature` fixed to `None`, CBOR-encoded and hashed to
/// produce the digest the issuer signs.
#[derive(Serialize)]
struct UnsignedCredential<'a> {
    id: &'a Id,
    issuer: &'a Id,
    subject: &'a Id,
    claims: &'a Claims,
    issued_at: &'a DateTime<Utc>,
    expires_at: &'a Option<DateTime<Utc>>,
    signature: Option<[u8; 64]>,
}

impl<'a> UnsignedCredential<'a> {
    fn digest(&self) -> Result<[u8; 32], ObjectError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ObjectError::Encoding(e.to_string()))?;
        Ok(lib_crypto::sha256(&buf))
    }
}
