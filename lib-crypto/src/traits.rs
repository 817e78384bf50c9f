//! Marker traits enforcing zeroization policy on key material.

use zeroize::Zeroize;

/// Marker trait for types holding cryptographic key material that must be
/// zeroized on drop.
///
/// Implementors should derive `ZeroizeOnDrop` rather than hand-roll `Drop`:
///
/// ```rust
/// use zeroize::{Zeroize, ZeroizeOnDrop};
/// use lib_crypto::traits::ZeroizingKey;
///
/// #[derive(Zeroize, ZeroizeOnDrop)]
/// pub struct SessionKey {
///     bytes: [u8; 32],
/// }
///
/// impl ZeroizingKey for SessionKey {}
/// ```
pub trait ZeroizingKey {}

/// Combines [`ZeroizingKey`] with [`Zeroize`] so generic code can both
/// require the zeroization marker and call `zeroize()` explicitly.
pub trait SecureKey: ZeroizingKey + Zeroize {}

impl<T: ZeroizingKey + Zeroize> SecureKey for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::ZeroizeOnDrop;

    #[derive(Zeroize, ZeroizeOnDrop)]
    struct TestSecret {
        bytes: Vec<u8>,
    }

    impl ZeroizingKey for TestSecret {}

    fn accepts_zeroizing_key<K: ZeroizingKey>(_key: K) {}

    #[test]
    fn marker_trait_is_object_usable() {
        let secret = TestSecret {
            bytes: vec![0xAA; 32],
        };
        accepts_zeroizing_key(secret);
    }

    #[test]
    fn secure_key_blanket_impl_allows_explicit_zeroize() {
        fn process<K: SecureKey>(mut key: K) {
            key.zeroize();
        }

        let secret = TestSecret {
            bytes: vec![0xFF; 64],
        };
        process(secret);
    }
}
