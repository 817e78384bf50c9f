//! Secure random number generation.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

/// Thin wrapper over the OS RNG, kept as a distinct type so callers depend
/// on this crate's RNG policy rather than on `rand::rngs::OsRng` directly.
pub struct SecureRng {
    rng: OsRng,
}

impl SecureRng {
    pub fn new() -> Self {
        Self { rng: OsRng }
    }

    pub fn generate_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.rng.fill_bytes(&mut bytes);
        bytes
    }

    pub fn generate_key(&mut self) -> [u8; 32] {
        let mut key = [0u8; 32];
        self.rng.fill_bytes(&mut key);
        key
    }
}

impl Default for SecureRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for SecureRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

impl CryptoRng for SecureRng {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_keys() {
        let mut rng = SecureRng::new();
        let a = rng.generate_key();
        let b = rng.generate_key();
        assert_ne!(a, b);
    }

    #[test]
    fn fills_requested_length() {
        let mut rng = SecureRng::new();
        assert_eq!(rng.generate_bytes(40).len(), 40);
    }
}
