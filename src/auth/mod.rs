//! Password derivation and verification.
//!
//! PBKDF2-HMAC-SHA256 with a per-user random salt. The derivation
//! parameters (iteration count, algorithm name, output length) are stored
//! alongside each record so they can be raised later without invalidating
//! hashes created under the old parameters.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

/// Default PBKDF2 iteration count for new registrations.
pub const PBKDF2_ITERATIONS: u32 = 150_000;

/// Salt byte length, generated once at registration.
pub const SALT_BYTES: usize = 16;

/// Derived-key output length in bytes.
pub const HASH_BYTES: usize = 32;

/// Algorithm tag stored per record.
pub const PBKDF2_ALGORITHM: &str = "sha256";

/// Generate a random per-user salt.
pub fn generate_salt() -> [u8; SALT_BYTES] {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Derive a verifiable secret from a plaintext password and salt.
pub fn derive_hash(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Re-derive with the stored parameters and compare in constant time.
pub fn verify_password(password: &str, salt: &[u8], iterations: u32, expected: &[u8]) -> bool {
    let candidate = derive_hash(password, salt, iterations);
    constant_time_eq(&candidate, expected)
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
