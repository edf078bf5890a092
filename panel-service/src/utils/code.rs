//! One-time setup codes handed to new tenants.

use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

/// 32 symbols without the easily confused `I`, `O`, `0` and `1`.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a code of the form `XXXX-XXXX` from the OS random source.
pub fn generate_setup_code() -> String {
    let mut rng = OsRng;
    let mut code = String::with_capacity(9);

    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.gen_range(0..CODE_ALPHABET.len());
        code.push(CODE_ALPHABET[idx] as char);
    }

    code
}

/// SHA-256 hex of the trimmed, uppercased code. Lookups hash user input the
/// same way, so codes are matched case-insensitively.
pub fn hash_setup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().to_uppercase().as_bytes());
    hex::encode(hasher.finalize())
}
