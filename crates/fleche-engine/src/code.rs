//! Game code generation: 4 characters of `[A-Z0-9]`, retried against the
//! store until an unused code is found.

use rand::Rng;

use crate::error::GameError;

const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 4;
const MAX_RETRIES: usize = 10;

/// One random 4-character code.
pub fn generate_code(rng: &mut impl Rng) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_CHARS[rng.gen_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Generate a code that `exists` does not know yet.
pub fn generate_unique_code<F>(rng: &mut impl Rng, mut exists: F) -> Result<String, GameError>
where
    F: FnMut(&str) -> Result<bool, GameError>,
{
    for _ in 0..MAX_RETRIES {
        let code = generate_code(rng);
        if !exists(&code)? {
            return Ok(code);
        }
    }
    Err(GameError::Generation(format!(
        "no unique game code after {MAX_RETRIES} attempts"
    )))
}
