use sha2::{Digest, Sha512};
use tower_cookies::Key;

/// Derives the 64-byte cookie signing key from an arbitrary-length secret.
pub fn derive_cookie_key(secret: &[u8]) -> Key {
    let digest = Sha512::digest(secret);
    Key::from(digest.as_slice())
}
