//! Password to key derivation using Argon2id

use crate::error::{ErrorCategory, ErrorKind, LockerError, Result};
use crate::policy::{KDF_POLICY, KEY_LEN, SALT_LEN};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

/// A 256-bit key derived from a password.
///
/// Wiped from memory when dropped. Never persisted.
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive a 32-byte key from a password and salt using Argon2id
///
/// Deterministic: the same password and salt always yield the same key.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> Result<DerivedKey> {
    let params = Params::new(
        KDF_POLICY.memory_kib,
        KDF_POLICY.time_cost,
        KDF_POLICY.lanes,
        Some(KDF_POLICY.output_len),
    )
    .map_err(|e| {
        LockerError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::KeyDerivation,
            format!("invalid Argon2id parameters: {}", e),
        )
    })?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|e| {
            LockerError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::KeyDerivation,
                format!("Argon2id key derivation failed: {}", e),
            )
        })?;

    Ok(DerivedKey(key))
}

/// Generate a fresh random salt from the operating system's CSPRNG.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt).map_err(|e| {
        LockerError::with_kind_and_source(
            ErrorCategory::Randomness,
            ErrorKind::EntropyUnavailable,
            "failed to generate salt",
            e,
        )
    })?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [7u8; SALT_LEN];
        let k1 = derive_key(b"correct horse", &salt).unwrap();
        let k2 = derive_key(b"correct horse", &salt).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let k1 = derive_key(b"correct horse", &[1u8; SALT_LEN]).unwrap();
        let k2 = derive_key(b"correct horse", &[2u8; SALT_LEN]).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_password_different_key() {
        let salt = [3u8; SALT_LEN];
        let k1 = derive_key(b"correct horse", &salt).unwrap();
        let k2 = derive_key(b"battery staple", &salt).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_empty_password_is_accepted() {
        let key = derive_key(b"", &[0u8; SALT_LEN]).unwrap();
        assert_ne!(key.as_bytes(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn test_salts_are_fresh() {
        let s1 = generate_salt().unwrap();
        let s2 = generate_salt().unwrap();
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = derive_key(b"pw", &[9u8; SALT_LEN]).unwrap();
        assert_eq!(format!("{:?}", key), "DerivedKey([REDACTED])");
    }
}
