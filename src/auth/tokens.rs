use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// 256 random bits, hex encoded. Used for verification and reset links.
pub fn generate_opaque_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Deterministic SHA-256 digest so a stored reset token cannot be redeemed as-is
/// but can still be looked up.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
