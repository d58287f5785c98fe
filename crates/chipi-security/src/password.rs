//! Password digests for the `users` table.
//!
//! Digests are unsalted lowercase-hex SHA-256 so databases created by earlier
//! Chipi releases keep working. This is weak against offline attacks and
//! should be replaced by a salted KDF together with a migration.

use ring::digest::{SHA256, digest};
use subtle::ConstantTimeEq;

pub fn hash_password(password: &str) -> String {
    let hash = digest(&SHA256, password.as_bytes());
    hash.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

/// Compare a submitted password against a stored digest in constant time.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let computed = hash_password(password);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
