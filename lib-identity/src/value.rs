//! Values stored under a key in the DHT: immutable, signed-mutable, or
//! encrypted-to-a-recipient.
//!
//! All three variants are expressed as one wire shape so storage and
//! transport code handles a single type; `Value::kind()` and the accessors
//! below discriminate behavior instead of matching on separate enum arms at
//! every call site, mirroring how the teacher's `ContractDhtData` keeps one
//! envelope shape across operation kinds.

use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::id::Id;

pub const MAX_VALUE_SIZE: usize = 1024;

/// A value as stored in and retrieved from the DHT.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Value {
    /// Present for signed-mutable and encrypted values; absent for
    /// immutable ones, whose id is derived purely from `data`.
    pub public_key: Option<[u8; 32]>,
    /// Present only for encrypted values: the recipient this value is
    /// sealed to.
    pub recipient: Option<[u8; 32]>,
    /// Present only for encrypted values: the sealed-box nonce.
    pub nonce: Option<[u8; 24]>,
    /// Present for signed-mutable and encrypted values.
    pub signature: Option<[u8; 64]>,
    pub sequence_number: u32,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Immutable,
    SignedMutable,
    Encrypted,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        if self.recipient.is_some() {
            ValueKind::Encrypted
        } else if self.public_key.is_some() {
            ValueKind::SignedMutable
        } else {
            ValueKind::Immutable
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.public_key.is_some()
    }

    /// Constructs an immutable value; its id is the SHA-256 digest of `data`.
    pub fn immutable(data: Vec<u8>) -> Result<Self, ValueError> {
        if data.len() > MAX_VALUE_SIZE {
            return Err(ValueError::TooLarge {
                max: MAX_VALUE_SIZE,
                got: data.len(),
            });
        }
        Ok(Value {
            public_key: None,
            recipient: None,
            nonce: None,
            signature: None,
            sequence_number: 0,
            data,
        })
    }

    /// Constructs a signed-mutable value. The signature covers the
    /// SHA-256 digest of `public_key || nonce || sequence_number_be32 ||
    /// data`, not the raw concatenation, so signing cost is independent
    /// of payload size.
    pub fn signed(
        identity: &crate::identity::NodeIdentity,
        sequence_number: u32,
        data: Vec<u8>,
    ) -> Result<Self, ValueError> {
        use crate::identity::Identity as _;

        if data.len() > MAX_VALUE_SIZE {
            return Err(ValueError::TooLarge {
                max: MAX_VALUE_SIZE,
                got: data.len(),
            });
        }
        let public_key = identity.public_key();
        let nonce = lib_crypto::Nonce::random();
        let digest = lib_crypto::sha256_multiple(&[
            &public_key,
            nonce.as_bytes(),
            &sequence_number.to_be_bytes(),
            &data,
        ]);
        let signature = identity.sign(&digest);

        Ok(Value {
            public_key: Some(public_key),
            recipient: None,
            nonce: Some(*nonce.as_bytes()),
            signature: Some(signature),
            sequence_number,
            data,
        })
    }

    /// Constructs a value encrypted to `recipient_public_key`, signed by
    /// `identity` over `public_key || recipient || nonce ||
    /// sequence_number_be32 || ciphertext`.
    pub fn encrypted(
        identity: &crate::identity::NodeIdentity,
        recipient_public_key: &[u8; 32],
        sequence_number: u32,
        plaintext: &[u8],
    ) -> Result<Self, ValueError> {
        use crate::identity::Identity as _;

        let sealed = identity.create_crypto_context(recipient_public_key)?;
        let nonce = lib_crypto::Nonce::random();
        let frame = sealed.encrypt(&nonce, plaintext)?;
        // `frame` is `nonce || ciphertext || mac`; the nonce is kept apart
        // in `self.nonce` so `data` holds only the sealed payload.
        let ciphertext = frame[lib_crypto::NONCE_LEN..].to_vec();
        if ciphertext.len() > MAX_VALUE_SIZE {
            return Err(ValueError::TooLarge {
                max: MAX_VALUE_SIZE,
                got: ciphertext.len(),
            });
        }

        let public_key = identity.public_key();
        let digest = lib_crypto::sha256_multiple(&[
            &public_key,
            recipient_public_key,
            nonce.as_bytes(),
            &sequence_number.to_be_bytes(),
            &ciphertext,
        ]);
        let signature = identity.sign(&digest);

        Ok(Value {
            public_key: Some(public_key),
            recipient: Some(*recipient_public_key),
            nonce: Some(*nonce.as_bytes()),
            signature: Some(signature),
            sequence_number,
            data: ciphertext,
        })
    }

    /// The id this value is stored under: the hash of `data` for immutable
    /// values, the hash of the owning public key otherwise.
    pub fn id(&self) -> Id {
        match self.public_key {
            Some(pk) => Id::from_hashed(&pk),
            None => Id::from_hashed(&self.data),
        }
    }

    /// Verifies internal consistency: immutable values hash-check against
    /// their id, mutable ones verify their signature.
    pub fn is_valid(&self) -> Result<(), ValueError> {
        match self.kind() {
            ValueKind::Immutable => {
                if Id::from_hashed(&self.data) != self.id() {
                    return Err(ValueError::ImmutableHashMismatch);
                }
                Ok(())
            }
            ValueKind::SignedMutable => {
                let pk = self.public_key.expect("checked by kind()");
                let sig = self.signature.ok_or(ValueError::InvalidSignature)?;
                let nonce = self.nonce.ok_or(ValueError::InvalidSignature)?;
                let digest = lib_crypto::sha256_multiple(&[
                    &pk,
                    &nonce,
                    &self.sequence_number.to_be_bytes(),
                    &self.data,
                ]);
                lib_crypto::classical::ed25519::ed25519_verify(&digest, &sig, &pk)
                    .map_err(|_| ValueError::InvalidSignature)
            }
            ValueKind::Encrypted => {
                let pk = self.public_key.expect("checked by kind()");
                let recipient = self.recipient.expect("checked by kind()");
                let sig = self.signature.ok_or(ValueError::InvalidSignature)?;
                let nonce = self.nonce.ok_or(ValueError::InvalidSignature)?;
                let digest = lib_crypto::sha256_multiple(&[
                    &pk,
                    &recipient,
                    &nonce,
                    &self.sequence_number.to_be_bytes(),
                    &self.data,
                ]);
                lib_crypto::classical::ed25519::ed25519_verify(&digest, &sig, &pk)
                    .map_err(|_| ValueError::InvalidSignature)
            }
        }
    }

    /// Decrypts an encrypted value's payload using the recipient's identity.
    pub fn decrypt(
        &self,
        recipient: &crate::identity::NodeIdentity,
    ) -> Result<Vec<u8>, ValueError> {
        let sender_pk = self.public_key.ok_or(ValueError::InvalidSignature)?;
        let sealed = recipient.create_crypto_context(&sender_pk)?;
        let nonce_bytes = self.nonce.ok_or(ValueError::InvalidSignature)?;
        let mut frame = Vec::with_capacity(24 + self.data.len());
        frame.extend_from_slice(&nonce_bytes);
        frame.extend_from_slice(&self.data);
        let (_, plaintext) = sealed.decrypt(&frame)?;
        Ok(plaintext)
    }

    /// Replaces this value's payload with a newer one signed by the same
    /// owner, incrementing `sequence_number` by one; the storage layer is
    /// what actually enforces monotonicity against its stored records.
    pub fn update(
        &self,
        identity: &crate::identity::NodeIdentity,
        new_data: Vec<u8>,
    ) -> Result<Self, ValueError> {
        use crate::identity::Identity as _;

        if identity.public_key() != self.public_key.unwrap_or_default() {
            return Err(ValueError::InvalidSignature);
        }
        Value::signed(identity, self.sequence_number + 1, new_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NodeIdentity;

    #[test]
    fn immutable_id_is_content_hash() {
        let v = Value::immutable(b"hello".to_vec()).unwrap();
        assert_eq!(v.id(), Id::from_hashed(b"hello"));
        v.is_valid().unwrap();
    }

    #[test]
    fn signed_value_round_trips_and_validates() {
        let node = NodeIdentity::generate();
        let v = Value::signed(&node, 1, b"payload".to_vec()).unwrap();
        assert_eq!(v.id(), Id::from_hashed(&node.public_key()));
        v.is_valid().unwrap();
    }

    #[test]
    fn tampering_with_signed_data_invalidates() {
        let node = NodeIdentity::generate();
        let mut v = Value::signed(&node, 1, b"payload".to_vec()).unwrap();
        v.data = b"tampered".to_vec();
        assert!(v.is_valid().is_err());
    }

    #[test]
    fn encrypted_value_decrypts_for_recipient_only() {
        let sender = NodeIdentity::generate();
        let recipient = NodeIdentity::generate();
        let outsider = NodeIdentity::generate();

        let v = Value::encrypted(&sender, &recipient.public_key(), 1, b"secret").unwrap();
        v.is_valid().unwrap();

        let plaintext = v.decrypt(&recipient).unwrap();
        assert_eq!(plaintext, b"secret");

        assert!(v.decrypt(&outsider).is_err());
    }

    #[test]
    fn update_requires_same_owner_and_increments_sequence() {
        let node = NodeIdentity::generate();
        let other = NodeIdentity::generate();
        let v = Value::signed(&node, 1, b"v1".to_vec()).unwrap();

        assert!(v.update(&other, b"v2".to_vec()).is_err());

        let updated = v.update(&node, b"v2".to_vec()).unwrap();
        assert_eq!(updated.sequence_number, 2);
        updated.is_valid().unwrap();
    }
}
