//! Initial password generation for new directory entries.

use rand::Rng;

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LENGTH: usize = 24;

/// Letters, digits and punctuation that survives mail clients and shells.
const ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#$%&*+-=?@^_";

/// Generate a random initial password.
///
/// Uses `rand::rng()`, the thread-local ChaCha generator seeded from the
/// operating system, which is suitable for credentials.
pub fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_PASSWORD_LENGTH)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
