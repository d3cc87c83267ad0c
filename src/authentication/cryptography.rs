use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::ApiError;

/// PHC string (`$argon2id$...`) with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            log::error!("Failed to hash password: {e}");
            ApiError::Internal(format!("{e}"))
        })
}

/// `Ok(false)` only for a mismatch. A stored hash that cannot be parsed or
/// checked is an internal error, never a silent login failure.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, ApiError> {
    let unreadable = |e: password_hash::Error| {
        log::error!("Unreadable password hash: {e}");
        ApiError::Internal(format!("{e}"))
    };

    let parsed = PasswordHash::new(stored).map_err(unreadable)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(unreadable(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_password_verifies() {
        let hash = hash_password("hunter2").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash).unwrap());
    }

    #[test]
    fn wrong_password_is_a_plain_mismatch() {
        let hash = hash_password("hunter2").unwrap();

        assert_eq!(verify_password("hunter3", &hash).ok(), Some(false));
        assert_eq!(verify_password("", &hash).ok(), Some(false));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("same").unwrap();
        let second = hash_password("same").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_is_internal() {
        let error = verify_password("anything", "not-a-phc-string").unwrap_err();
        assert!(matches!(error, ApiError::Internal(_)));
    }
}
