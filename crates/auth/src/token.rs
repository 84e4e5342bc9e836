//! Unguessable token generation (session ids, CSRF tokens).

use rand::{RngCore, rngs::OsRng};

/// Bytes of OS randomness behind every token.
pub const TOKEN_BYTES: usize = 32;

/// Produces opaque, unguessable tokens.
pub trait TokenSource: Send + Sync + core::fmt::Debug {
    fn token(&self) -> String;
}

/// 32 bytes from the operating system CSPRNG, hex encoded (64 chars).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn token(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// Whether `raw` has the shape of a token produced by [`OsTokenSource`].
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() == TOKEN_BYTES * 2 && raw.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_hex_and_distinct() {
        let source = OsTokenSource;
        let a = source.token();
        let b = source.token();

        assert_eq!(a.len(), 64);
        assert!(is_well_formed(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn shape_check_rejects_garbage() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("abc"));
        assert!(!is_well_formed(&"z".repeat(64)));
    }
}
