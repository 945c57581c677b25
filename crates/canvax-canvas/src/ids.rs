//! Random session codes and client ids.

use rand::Rng;

/// Alphabet for codes and ids: ASCII letters and digits.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const SESSION_CODE_LEN: usize = 6;
pub const CLIENT_ID_LEN: usize = 8;

/// Generate a random alphanumeric string of `len` characters.
///
/// No uniqueness check is made against live codes or ids.
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Whether `code` could have been produced by [`random_alphanumeric`].
pub fn is_well_formed(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_alphanumeric())
}
