//! Password hashing and constant-time verification.
//!
//! Hashes are PHC strings produced by PBKDF2-HMAC-SHA256:
//! `$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`. The round count lives in
//! the string, so hashes created with different costs verify side by side.

use crate::error::{AuthError, Result};
use pbkdf2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Algorithm, Params, Pbkdf2};
use rand::rngs::OsRng;
use rand::RngCore;

/// Default PBKDF2 rounds for newly hashed passwords.
pub const DEFAULT_HASH_ROUNDS: u32 = 100_000;

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Derived key length in bytes.
const OUTPUT_LEN: usize = 32;

/// Fixed salt for [`decoy_hash`]. Decoy output is never stored.
const DECOY_SALT: &str = "c2Vzc2lvbmdhdGUtZGVjb3k";

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str, rounds: u32) -> Result<String> {
    if rounds == 0 {
        return Err(AuthError::internal_msg("hash password", "rounds must be positive"));
    }

    let mut salt_bytes = [0u8; SALT_BYTES];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| AuthError::internal("read password salt", e))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::internal_msg("encode password salt", e))?;

    derive(password, rounds, &salt)
}

/// Run one PBKDF2 derivation of `candidate` at `rounds`, the same work
/// [`verify_password`] does against a hash with that round count.
///
/// Used in place of a real check when the username is unknown, so both
/// rejection paths cost the same.
pub fn decoy_hash(candidate: &str, rounds: u32) -> Result<String> {
    if rounds == 0 {
        return Err(AuthError::internal_msg("decoy hash", "rounds must be positive"));
    }
    let salt =
        SaltString::from_b64(DECOY_SALT).map_err(|e| AuthError::internal_msg("decoy salt", e))?;
    derive(candidate, rounds, &salt)
}

fn derive(password: &str, rounds: u32, salt: &SaltString) -> Result<String> {
    let params = Params {
        rounds,
        output_length: OUTPUT_LEN,
    };
    let hash = Pbkdf2
        .hash_password_customized(
            password.as_bytes(),
            Some(Algorithm::Pbkdf2Sha256.ident()),
            None,
            params,
            salt,
        )
        .map_err(|e| AuthError::internal_msg("hash password", e))?;

    Ok(hash.to_string())
}

/// Check `candidate` against a stored PHC hash.
///
/// `Ok(false)` is a plain mismatch. Errors are reserved for hashes that do
/// not parse or name an unsupported algorithm. The final digest comparison
/// is constant-time.
pub fn verify_password(stored_hash: &str, candidate: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::internal_msg("parse stored password hash", e))?;

    match Pbkdf2.verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::internal_msg("verify password", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    // Low cost keeps the unit tests fast; the format is the same.
    const TEST_ROUNDS: u32 = 1_000;

    #[test]
    fn hash_then_verify_matches() {
        let hash = hash_password("correct-pw", TEST_ROUNDS).unwrap();
        assert!(hash.starts_with("$pbkdf2-sha256$"));
        assert!(hash.contains("i=1000"));
        assert!(verify_password(&hash, "correct-pw").unwrap());
    }

    #[test]
    fn one_character_difference_is_mismatch_not_error() {
        let hash = hash_password("correct-pw", TEST_ROUNDS).unwrap();
        assert!(!verify_password(&hash, "correct-pX").unwrap());
        assert!(!verify_password(&hash, "correct-p").unwrap());
        assert!(!verify_password(&hash, "").unwrap());
    }

    #[test]
    fn same_password_gets_different_salts() {
        let h1 = hash_password("test_password", TEST_ROUNDS).unwrap();
        let h2 = hash_password("test_password", TEST_ROUNDS).unwrap();
        assert_ne!(h1, h2);
        assert!(verify_password(&h1, "test_password").unwrap());
        assert!(verify_password(&h2, "test_password").unwrap());
    }

    #[test]
    fn malformed_hash_is_error() {
        let err = verify_password("not-a-phc-string", "anything").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err = verify_password("$argon2id$v=19$m=16,t=2,p=1$c2FsdHNhbHQ$aGFzaA", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn zero_rounds_rejected() {
        assert!(hash_password("pw", 0).is_err());
    }

    #[test]
    fn decoy_costs_the_same_rounds_as_a_real_hash() {
        let real = hash_password("correct-pw", 1_234).unwrap();
        let decoy = decoy_hash("whatever", 1_234).unwrap();
        assert_eq!(rounds_of(&real), 1_234);
        assert_eq!(rounds_of(&decoy), rounds_of(&real));
        // Fixed salt: the decoy is deterministic and never a stored credential.
        assert_eq!(decoy, decoy_hash("whatever", 1_234).unwrap());
        assert!(!verify_password(&decoy, "correct-pw").unwrap());
        assert!(decoy_hash("whatever", 0).is_err());
    }

    fn rounds_of(phc: &str) -> u32 {
        let parsed = PasswordHash::new(phc).unwrap();
        Params::try_from(&parsed).unwrap().rounds
    }
}
