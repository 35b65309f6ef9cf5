use rand::RngCore;
use sha2::{Digest, Sha256};

/// 32 random bytes, hex encoded. Used for password reset links.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Storage key for a one-time token; the raw token is never persisted.
pub fn digest_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
