//! A `Vouch` is a third party's signed endorsement of a [`Credential`],
//! letting a relying party weigh attestations by how many independent
//! parties vouch for them rather than trusting a single issuer outright.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::Claims;
use crate::credential::Credential;
use crate::error::ObjectError;
use crate::id::Id;
use crate::identity::{Identity, NodeIdentity};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vouch {
    pub voucher: Id,
    pub credential_id: Id,
    pub claims: Claims,
    pub issued_at: DateTime<Utc>,
    pub signature: [u8; 64],
}

impl Vouch {
    pub fn issue(
        voucher: &NodeIdentity,
        credential: &Credential,
        claims: Claims,
    ) -> Result<Self, ObjectError> {
        let voucher_id = voucher.id();
        let issued_at = Utc::now();

        let unsigned = UnsignedVouch {
            voucher: &voucher_id,
            credential_id: &credential.id,
            claims: &claims,
            issued_at: &issued_at,
            signature: None,
        };
        let digest = unsigned.digest()?;
        let signature = voucher.sign(&digest);

        Ok(Vouch {
            voucher: voucher_id,
            credential_id: credential.id,
            claims,
            issued_at,
            signature,
        })
    }

    pub fn verify(&self, voucher_public_key: &[u8; 32]) -> Result<(), ObjectError> {
        if self.voucher != Id::from_hashed(voucher_public_key) {
            return Err(ObjectError::InvalidSignature);
        }
        let unsigned = UnsignedVouch {
            voucher: &self.voucher,
            credential_id: &self.credential_id,
            claims: &self.claims,
            issued_at: &self.issued_at,
            signature: None,
        };
        let digest = unsigned.digest()?;
        lib_crypto::classical::ed25519::ed25519_verify(&digest, &self.signature, voucher_public_key)
            .map_err(|_| ObjectError::InvalidSignature)
    }
}

/// The unsigned form of a [`Vouch`]: identical shape to the signed struct,
/// with `signature` fixed to `None`, CBOR-encoded and hashed to produce the
/// digest the voucher signs.
#[derive(Serialize)]
struct UnsignedVouch<'a> {
    voucher: &'a Id,
    credential_id: &'a Id,
    claims: &'a Claims,
    issued_at: &'a DateTime<Utc>,
    signature: Option<[u8; 64]>,
}

impl<'a> UnsignedVouch<'a> {
    fn digest(&self) -> Result<[u8; 32], ObjectError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ObjectError::Encoding(e.to_string()))?;
        Ok(lib_crypto::sha256(&buf))
    }
}

/// Counts how many distinct vouchers (by id) endorse `credential_id` among
/// `vouches`, after verifying each against the public key its `voucher` id
/// is claimed to derive from. Callers supply the id-to-public-key lookup
/// since this crate has no storage of its own.
pub fn count_valid_vouches<F>(
    credential_id: &Id,
    vouches: &[Vouch],
    resolve_public_key: F,
) -> usize
where
    F: Fn(&Id) -> Option<[u8; 32]>,
{
    let mut seen = std::collections::HashSet::new();
    vouches
        .iter()
        .filter(|v| &v.credential_id == credential_id)
        .filter(|v| seen.insert(v.voucher))
        .filter(|v| {
            resolve_public_key(&v.voucher)
                .map(|pk| v.verify(&pk).is_ok())
                .unwrap_or(false)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_roundtrip() {
        let issuer = NodeIdentity::generate();
        let subject = NodeIdentity::generate();
        let voucher = NodeIdentity::generate();

        let credential =
            Credential::issue(&issuer, subject.id(), Claims::new(), None).unwrap();
        let vouch = Vouch::issue(&voucher, &credential, Claims::new()).unwrap();

        vouch.verify(&voucher.public_key()).unwrap();
    }

    #[test]
    fn count_valid_vouches_deduplicates_and_verifies() {
        let issuer = NodeIdentity::generate();
        let subject = NodeIdentity::generate();
        let credential =
            Credential::issue(&issuer, subject.id(), Claims::new(), None).unwrap();

        let voucher_a = NodeIdentity::generate();
        let voucher_b = NodeIdentity::generate();

        let vouch_a1 = Vouch::issue(&voucher_a, &credential, Claims::new()).unwrap();
        let vouch_a2 = Vouch::issue(&voucher_a, &credential, Claims::new()).unwrap();
        let vouch_b = Vouch::issue(&voucher_b, &credential, Claims::new()).unwrap();

        let keys = std::collections::HashMap::from([
            (voucher_a.id(), voucher_a.public_key()),
            (voucher_b.id(), voucher_b.public_key()),
        ]);

        let count = count_valid_vouches(&credential.id, &[vouch_a1, vouch_a2, vouch_b], |id| {
            keys.get(id).copied()
        });
        assert_eq!(count, 2);
    }
}
