use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// 128 bits, hex-encoded.
pub const VERIFICATION_TOKEN_BYTES: usize = 16;
pub const SESSION_TOKEN_BYTES: usize = 32;
pub const CSRF_TOKEN_BYTES: usize = 32;
pub const RESET_TOKEN_BYTES: usize = 32;

/// Hex-encoded random secret of `len` bytes drawn from the OS RNG.
pub fn generate_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Tokens are persisted only as their SHA-256 digest.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
