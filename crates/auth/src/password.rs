//! Password hashing and verification.
//!
//! New hashes are Argon2id PHC strings. Stored bcrypt hashes (`$2a$`, `$2b$`,
//! `$2y$`) written by earlier deployments are still accepted on verify.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    /// The stored hash is neither a parseable PHC string nor a bcrypt hash.
    #[error("malformed password hash: {0}")]
    MalformedHash(String),
}

/// Argon2 cost parameters. Verification always uses the parameters embedded
/// in the stored hash; these only apply to new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl PasswordParams {
    fn to_argon2(self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MiB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash `password` with a fresh random salt.
///
/// CPU-bound: call from `spawn_blocking` on async paths.
pub fn hash_password(password: &str, params: PasswordParams) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = params
        .to_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored hash (Argon2 PHC or bcrypt).
///
/// `Ok(false)` is a mismatch; `Err` means the stored hash itself is unusable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    if is_bcrypt(hash) {
        return bcrypt::verify(password, hash).map_err(|e| PasswordError::MalformedHash(e.to_string()));
    }
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// True for hashes that should be replaced with Argon2id on next login.
pub fn needs_rehash(hash: &str) -> bool {
    is_bcrypt(hash)
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|p| hash.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: PasswordParams = PasswordParams {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("admin123", FAST).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("admin123", &hash).unwrap());
        assert!(!verify_password("admin124", &hash).unwrap());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("secret", FAST).unwrap();
        let b = hash_password("secret", FAST).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("secret", &a).unwrap());
        assert!(verify_password("secret", &b).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        assert!(matches!(
            verify_password("x", "plaintext-password"),
            Err(PasswordError::MalformedHash(_))
        ));
    }

    #[test]
    fn accepts_bcrypt_hashes_from_legacy_rows() {
        // crypt_blowfish reference vector, and a PHP-style `$2y$` hash.
        let reference = "$2a$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW";
        assert!(verify_password("U*U", reference).unwrap());
        assert!(!verify_password("U*V", reference).unwrap());

        let php = "$2y$04$abcdefghijklmnopqrstuur/uCBNBvVl4m8sbz1ePRFisPkMaJiTS";
        assert!(verify_password("admin123", php).unwrap());
        assert!(!verify_password("admin124", php).unwrap());
        assert!(needs_rehash(php));
    }

    #[test]
    fn truncated_bcrypt_hash_is_malformed() {
        assert!(matches!(
            verify_password("admin123", "$2y$10$short"),
            Err(PasswordError::MalformedHash(_))
        ));
    }

    #[test]
    fn argon2_hashes_do_not_need_rehash() {
        let hash = hash_password("admin123", FAST).unwrap();
        assert!(!needs_rehash(&hash));
    }

    #[test]
    fn rejects_nonsense_params() {
        let bad = PasswordParams {
            memory_kib: 0,
            iterations: 0,
            parallelism: 0,
        };
        assert!(matches!(hash_password("x", bad), Err(PasswordError::Params(_))));
    }
}
