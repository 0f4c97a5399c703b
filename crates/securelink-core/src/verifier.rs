//! Secret checks used by the access evaluator.
//!
//! Passwords are never stored. A policy keeps an Argon2id PHC string and
//! checks submitted passwords against it. OTP codes are format-checked only;
//! there is no issuing backend behind them.

use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, PolicyError};

/// Number of digits an OTP code must have.
pub const OTP_DIGITS: usize = 6;

/// Argon2id verifier for a link password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordVerifier(String);

impl PasswordVerifier {
    /// Hash a plaintext password with a random salt.
    pub fn hash(password: &str) -> Result<Self, PolicyError> {
        if password.is_empty() {
            return Err(PolicyError::MissingPassword);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PolicyError::Hashing(e.to_string()))?;

        Ok(Self(hash.to_string()))
    }

    /// Wrap an existing PHC string, checking that it parses.
    pub fn from_phc(phc: impl Into<String>) -> Result<Self, CoreError> {
        let phc = phc.into();
        PasswordHash::new(&phc).map_err(|e| CoreError::InvalidVerifier(e.to_string()))?;
        Ok(Self(phc))
    }

    /// The PHC string.
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    /// Check a submitted password.
    ///
    /// A verifier that no longer parses matches nothing.
    pub fn verify(&self, candidate: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for PasswordVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordVerifier(<redacted>)")
    }
}

/// Whether `code` is exactly [`OTP_DIGITS`] ASCII digits.
pub fn is_valid_otp_format(code: &str) -> bool {
    code.len() == OTP_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_correct_and_incorrect() {
        let verifier = PasswordVerifier::hash("hunter2").unwrap();

        assert!(verifier.verify("hunter2"));
        assert!(!verifier.verify("hunter3"));
        assert!(!verifier.verify(""));
    }

    #[test]
    fn test_verifier_never_holds_plaintext() {
        let verifier = PasswordVerifier::hash("correct horse").unwrap();

        assert!(!verifier.as_phc().contains("correct horse"));
        assert!(verifier.as_phc().starts_with("$argon2id$"));
        assert_eq!(format!("{:?}", verifier), "PasswordVerifier(<redacted>)");
    }

    #[test]
    fn test_empty_password_rejected() {
        assert_eq!(
            PasswordVerifier::hash("").unwrap_err(),
            PolicyError::MissingPassword
        );
    }

    #[test]
    fn test_from_phc_roundtrip() {
        let verifier = PasswordVerifier::hash("pw").unwrap();
        let restored = PasswordVerifier::from_phc(verifier.as_phc()).unwrap();

        assert!(restored.verify("pw"));
        assert!(PasswordVerifier::from_phc("not a phc string").is_err());
    }

    #[test]
    fn test_otp_format() {
        assert!(is_valid_otp_format("123456"));
        assert!(is_valid_otp_format("000000"));
        assert!(!is_valid_otp_format("12345"));
        assert!(!is_valid_otp_format("1234567"));
        assert!(!is_valid_otp_format("12a456"));
        assert!(!is_valid_otp_format(" 23456"));
        assert!(!is_valid_otp_format("١٢٣٤٥٦"));
        assert!(!is_valid_otp_format(""));
    }
}
