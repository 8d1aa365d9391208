//! Short human-entered challenge codes.
//!
//! A challenge code bridges an external task-completion event back to the
//! session that requested it: the landing page shows the code, the client
//! types it back in. Codes are short-lived and matched case-insensitively.

use rand::rngs::OsRng;
use rand::RngCore;

/// Crockford Base32 charset (excludes 0/O/1/I/L/U for readability).
const CODE_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTVWXYZ";
const CODE_LENGTH: usize = 6;

/// Generate a random 6-character challenge code.
///
/// Displayed as `ABC-234`; the dash is cosmetic and stripped before
/// comparison.
#[must_use]
pub fn generate_challenge_code() -> String {
    let mut random = [0u8; CODE_LENGTH];
    OsRng.fill_bytes(&mut random);

    let code: String = random
        .iter()
        .map(|&b| CODE_CHARSET[b as usize % CODE_CHARSET.len()] as char)
        .collect();

    format!("{}-{}", &code[..3], &code[3..])
}

/// Normalize a challenge code from user input.
///
/// Strips dashes, uppercases, and validates length and charset. Returns
/// `None` for anything that could never have been issued.
#[must_use]
pub fn normalize_challenge_code(input: &str) -> Option<String> {
    let normalized: String = input
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.len() != CODE_LENGTH {
        return None;
    }

    if normalized.bytes().any(|b| !CODE_CHARSET.contains(&b)) {
        return None;
    }

    Some(normalized)
}

/// Check if input looks like a challenge code.
#[must_use]
pub fn is_challenge_code(input: &str) -> bool {
    normalize_challenge_code(input).is_some()
}
