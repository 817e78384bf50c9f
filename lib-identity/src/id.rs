//! 256-bit node/key identifiers and XOR-metric keyspace algebra.
//!
//! Mirrors the teacher's `NodeId` (fixed-size byte array, manual `Ord` for
//! deterministic tie-breaking) but the ordering here is the keyspace's own
//! big-endian byte order rather than a CRDT tie-break rule, and distance is
//! XOR rather than identity.

use std::cmp::Ordering;
use std::fmt;

use crate::error::IdentityError;

pub const ID_LEN: usize = 32;
pub const ID_BITS: usize = ID_LEN * 8;

/// A 256-bit identifier in the DHT keyspace: node ids, value ids, and key
/// ids are all instances of this same type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Id([u8; ID_LEN]);

impl Id {
    pub const ZERO: Id = Id([0u8; ID_LEN]);

    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Id(bytes)
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != ID_LEN {
            return Err(IdentityError::InvalidIdLength(bytes.len()));
        }
        let mut out = [0u8; ID_LEN];
        out.copy_from_slice(bytes);
        Ok(Id(out))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Derives an id by hashing arbitrary data, e.g. the raw bytes of a
    /// public key, with SHA-256.
    pub fn from_hashed(data: &[u8]) -> Self {
        Id(lib_crypto::sha256(data))
    }

    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; ID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Id(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
        Self::try_from_slice(&bytes)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, IdentityError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| IdentityError::InvalidBase58(e.to_string()))?;
        Self::try_from_slice(&bytes)
    }

    pub fn to_did_string(&self) -> String {
        format!("did:boson:{}", self.to_base58())
    }

    pub fn from_did_string(s: &str) -> Result<Self, IdentityError> {
        let rest = s
            .strip_prefix("did:boson:")
            .ok_or_else(|| IdentityError::InvalidDidUri(s.to_string()))?;
        Self::from_base58(rest)
    }

    /// 256-bit unsigned addition with wrap-around (no overflow error).
    pub fn add(&self, other: &Id) -> Id {
        let mut out = [0u8; ID_LEN];
        let mut carry = 0u16;
        for i in (0..ID_LEN).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            out[i] = sum as u8;
            carry = sum >> 8;
        }
        Id(out)
    }

    /// XOR distance between two ids, the DHT's sole metric.
    pub fn distance(&self, other: &Id) -> Id {
        let mut out = [0u8; ID_LEN];
        for i in 0..ID_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        Id(out)
    }

    /// A coarse integer approximation of distance: how many significant
    /// bits the two ids differ by, used where sorting by the full 256-bit
    /// distance isn't needed (logging, bucket statistics).
    pub fn approx_distance(&self, other: &Id) -> u32 {
        ID_BITS as u32 - self.distance(other).leading_zeros()
    }

    /// Number of leading zero bits, used to select a routing bucket index.
    pub fn leading_zeros(&self) -> u32 {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return (i as u32) * 8 + byte.leading_zeros();
            }
        }
        ID_BITS as u32
    }

    pub fn trailing_zeros(&self) -> u32 {
        for (i, byte) in self.0.iter().enumerate().rev() {
            if *byte != 0 {
                return ((ID_LEN - 1 - i) as u32) * 8 + byte.trailing_zeros();
            }
        }
        ID_BITS as u32
    }

    /// Returns the value of bit `n`, counting from the most significant bit.
    pub fn bit(&self, n: usize) -> bool {
        let byte = self.0[n / 8];
        let shift = 7 - (n % 8);
        (byte >> shift) & 1 == 1
    }

    /// True if `self` and `other` agree on the first `n` bits.
    pub fn bits_equal(&self, other: &Id, n: usize) -> bool {
        let full_bytes = n / 8;
        if self.0[..full_bytes] != other.0[..full_bytes] {
            return false;
        }
        let remaining = n % 8;
        if remaining == 0 {
            return true;
        }
        let mask = !0u8 << (8 - remaining);
        (self.0[full_bytes] & mask) == (other.0[full_bytes] & mask)
    }

    /// Copies the first `n` bits of `src` onto `self`, leaving the rest
    /// unchanged, returning the result.
    pub fn bits_copy(&self, src: &Id, n: usize) -> Id {
        let mut out = self.0;
        let full_bytes = n / 8;
        out[..full_bytes].copy_from_slice(&src.0[..full_bytes]);
        let remaining = n % 8;
        if remaining > 0 {
            let mask = !0u8 << (8 - remaining);
            out[full_bytes] = (src.0[full_bytes] & mask) | (out[full_bytes] & !mask);
        }
        Id(out)
    }

    /// Sets bit `n` (counting from the most significant bit) of `self`.
    pub fn of_bit(&self, n: usize, value: bool) -> Id {
        let mut out = self.0;
        let shift = 7 - (n % 8);
        if value {
            out[n / 8] |= 1 << shift;
        } else {
            out[n / 8] &= !(1 << shift);
        }
        Id(out)
    }

    /// Constructs an id whose XOR-distance from `self` has exactly the
    /// bottom `n` bits set (and nothing above them): forms a mask with
    /// the top `256 - n` bits clear and the bottom `n` bits set, then
    /// XORs it with `self`. Used to pick an id in routing bucket `n`.
    pub fn id_by_distance(&self, n: u32) -> Id {
        let n = n.min(ID_BITS as u32) as usize;
        let mut mask = [0u8; ID_LEN];
        let full_bytes = n / 8;
        for byte in mask.iter_mut().skip(ID_LEN - full_bytes) {
            *byte = 0xFF;
        }
        let remaining = n % 8;
        if remaining > 0 {
            let idx = ID_LEN - full_bytes - 1;
            mask[idx] = (1u8 << remaining) - 1;
        }
        self.distance(&Id(mask))
    }

    /// Three-way comparison of `self` and `other` by distance to `reference`,
    /// used to order candidates during closest-node selection.
    pub fn three_way_compare(&self, other: &Id, reference: &Id) -> Ordering {
        let d1 = self.distance(reference);
        let d2 = other.distance(reference);
        d1.0.cmp(&d2.0)
    }

    /// Collapses the 32 bytes into a 32-bit accumulator by XOR-folding
    /// every eighth byte into one of its four bytes.
    pub fn hash_code(&self) -> u32 {
        let mut acc = [0u8; 4];
        for (i, byte) in self.0.iter().enumerate() {
            acc[i % 4] ^= byte;
        }
        u32::from_be_bytes(acc)
    }

    /// Parses a string id, trying Base58 first, then `0x`-prefixed hex,
    /// then the `did:boson:<base58>` alias.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        if let Ok(id) = Self::from_base58(s) {
            return Ok(id);
        }
        if let Some(hex_part) = s.strip_prefix("0x") {
            if let Ok(id) = Self::from_hex(hex_part) {
                return Ok(id);
            }
        }
        Self::from_did_string(s)
    }

    /// Interprets these bytes as an Ed25519 public key, validating that
    /// they decode to a point on the curve.
    pub fn to_signature_key(&self) -> Result<[u8; 32], IdentityError> {
        lib_crypto::ed25519_validate_public_key(&self.0)?;
        Ok(self.0)
    }

    /// Derives the X25519 public key used for session key agreement from
    /// these bytes interpreted as an Ed25519 public key.
    pub fn to_encryption_key(&self) -> Result<[u8; 32], IdentityError> {
        let x25519 = lib_crypto::ed25519_public_to_x25519(&self.0)?;
        Ok(x25519.to_bytes())
    }
}

impl std::str::FromStr for Id {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn distance_is_symmetric_and_self_zero() {
        let a = Id::random();
        let b = Id::random();
        assert_eq!(a.distance(&a), Id::ZERO);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn bits_equal_matches_prefix() {
        let a = Id::from_bytes([0b1010_0000; ID_LEN]);
        let b = Id::from_bytes([0b1010_1111; ID_LEN]);
        assert!(a.bits_equal(&b, 4));
        assert!(!a.bits_equal(&b, 5));
    }

    #[test]
    fn bits_copy_preserves_tail() {
        let dst = Id::from_bytes([0xFF; ID_LEN]);
        let src = Id::from_bytes([0x00; ID_LEN]);
        let out = dst.bits_copy(&src, 8);
        assert_eq!(out.as_bytes()[0], 0x00);
        assert_eq!(out.as_bytes()[1], 0xFF);
    }

    #[test]
    fn leading_zeros_of_zero_is_full_width() {
        assert_eq!(Id::ZERO.leading_zeros(), ID_BITS as u32);
    }

    #[test]
    fn base58_and_hex_roundtrip() {
        let id = Id::random();
        assert_eq!(Id::from_base58(&id.to_base58()).unwrap(), id);
        assert_eq!(Id::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn did_string_roundtrip() {
        let id = Id::random();
        let did = id.to_did_string();
        assert!(did.starts_with("did:boson:"));
        assert_eq!(Id::from_did_string(&did).unwrap(), id);
    }

    #[test]
    fn three_way_compare_orders_by_distance() {
        let reference = Id::from_bytes([0u8; ID_LEN]);
        let near = Id::from_bytes([0x01; ID_LEN]);
        let far = Id::from_bytes([0xFF; ID_LEN]);
        assert_eq!(
            near.three_way_compare(&far, &reference),
            Ordering::Less
        );
    }

    #[test]
    fn of_bit_sets_and_clears() {
        let id = Id::ZERO.of_bit(0, true);
        assert!(id.bit(0));
        let id2 = id.of_bit(0, false);
        assert!(!id2.bit(0));
    }

    #[test]
    fn add_wraps_around() {
        let max = Id::from_bytes([0xFF; ID_LEN]);
        let one = Id::ZERO.of_bit(ID_BITS - 1, true);
        assert_eq!(max.add(&one), Id::ZERO);
    }

    #[test]
    fn id_by_distance_yields_exact_distance() {
        let base = Id::random();
        let far = base.id_by_distance(12);
        assert_eq!(base.distance(&far).leading_zeros(), ID_BITS as u32 - 12);
    }

    #[test]
    fn parse_accepts_base58_hex_and_did() {
        let id = Id::random();
        assert_eq!(Id::parse(&id.to_base58()).unwrap(), id);
        assert_eq!(Id::parse(&format!("0x{}", id.to_hex())).unwrap(), id);
        assert_eq!(Id::parse(&id.to_did_string()).unwrap(), id);
    }

    #[test]
    fn approx_distance_is_bit_width_of_distance() {
        let a = Id::ZERO;
        let b = Id::ZERO.of_bit(ID_BITS - 1, true);
        assert_eq!(a.approx_distance(&b), 1);
        assert_eq!(a.approx_distance(&a), 0);
    }

    #[test]
    fn signature_and_encryption_keys_round_trip_through_a_real_keypair() {
        use crate::identity::{Identity, NodeIdentity};

        let node = NodeIdentity::generate();
        let pk_id = Id::from_bytes(node.public_key());

        assert_eq!(pk_id.to_signature_key().unwrap(), node.public_key());
        assert!(pk_id.to_encryption_key().is_ok());
    }

    proptest::proptest! {
        /// XOR distance is symmetric and zero exactly at the diagonal, for
        /// arbitrary ids, not just the two random samples the unit test above
        /// happens to draw.
        #[test]
        fn distance_is_symmetric_for_any_pair(a in proptest::array::uniform32(proptest::prelude::any::<u8>()), b in proptest::array::uniform32(proptest::prelude::any::<u8>())) {
            let a = Id::from_bytes(a);
            let b = Id::from_bytes(b);
            prop_assert_eq!(a.distance(&a), Id::ZERO);
            prop_assert_eq!(a.distance(&b), b.distance(&a));
        }

        /// `approx_distance` is always `ID_BITS - leading_zeros` of the XOR
        /// distance, and agrees with `Ord` on the byte array: a smaller id
        /// under the big-endian byte order is never reported as farther from
        /// zero than a larger one.
        #[test]
        fn approx_distance_matches_leading_zeros_definition(a in proptest::array::uniform32(proptest::prelude::any::<u8>()), b in proptest::array::uniform32(proptest::prelude::any::<u8>())) {
            let a = Id::from_bytes(a);
            let b = Id::from_bytes(b);
            let distance = a.distance(&b);
            prop_assert_eq!(a.approx_distance(&b), ID_BITS as u32 - distance.leading_zeros());
        }

        /// `three_way_compare` against a fixed reference is a strict weak
        /// ordering consistent with comparing XOR distances directly.
        #[test]
        fn three_way_compare_matches_direct_distance_comparison(a in proptest::array::uniform32(proptest::prelude::any::<u8>()), b in proptest::array::uniform32(proptest::prelude::any::<u8>()), reference in proptest::array::uniform32(proptest::prelude::any::<u8>())) {
            let a = Id::from_bytes(a);
            let b = Id::from_bytes(b);
            let reference = Id::from_bytes(reference);
            prop_assert_eq!(
                a.three_way_compare(&b, &reference),
                a.distance(&reference).cmp(&b.distance(&reference))
            );
        }
    }
}
