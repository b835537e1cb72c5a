//! Signed session tokens.
//!
//! Wire form is a compact JWS: `base64url(header).base64url(claims).base64url(mac)`
//! with no padding, so the token is safe to carry as an HTTP bearer credential.
//! The MAC is HMAC-SHA-512 over `header.claims` keyed by the process-wide
//! signing secret. Claims carry the username and 512 bytes of OS randomness,
//! which makes every issued token unique even for the same user.
//!
//! Rotating the secret invalidates every outstanding token's signature.

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

type HmacSha512 = Hmac<Sha512>;

/// Random salt length embedded in every token.
pub const RANDOM_SALT_BYTES: usize = 512;

/// Only signing algorithm issued or accepted.
const ALGORITHM: &str = "HS512";

/// An issued session token. Opaque to everything but [`TokenIssuer::verify`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token string received from a client.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Short stable digest for log lines. Never log the token itself.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

impl From<String> for SessionToken {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub username: String,
    /// Standard base64 of the raw salt bytes.
    pub random_salt: String,
}

/// Issues and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a token for `username` using the OS random source.
    pub fn issue(&self, username: &str) -> Result<SessionToken> {
        self.issue_with_rng(username, &mut OsRng)
    }

    /// Issue a token drawing the salt from `rng`.
    ///
    /// Uses the fallible fill: a failing source is an error, never a
    /// silent fallback to weaker randomness.
    pub fn issue_with_rng<R: RngCore + CryptoRng>(
        &self,
        username: &str,
        rng: &mut R,
    ) -> Result<SessionToken> {
        let mut salt = vec![0u8; RANDOM_SALT_BYTES];
        rng.try_fill_bytes(&mut salt)
            .map_err(|e| AuthError::internal("read random salt", e))?;

        let claims = TokenClaims {
            username: username.to_string(),
            random_salt: STANDARD.encode(&salt),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &TokenClaims) -> Result<SessionToken> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| AuthError::internal("encode token header", e))?;
        let claims_json =
            serde_json::to_vec(claims).map_err(|e| AuthError::internal("encode token claims", e))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );

        let mut mac = self.mac("sign token")?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(SessionToken(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        )))
    }

    /// Check a token's structure and signature and return its claims.
    ///
    /// Every failure is [`AuthError::InvalidToken`] except an unusable
    /// secret, which is internal.
    pub fn verify(&self, token: &SessionToken) -> Result<TokenClaims> {
        const CONTEXT: &str = "verify token";

        let mut parts = token.as_str().split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::invalid_token(CONTEXT, "expected three segments"));
        };

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| AuthError::invalid_token(CONTEXT, "header is not base64url"))?;
        let header: Header = serde_json::from_slice(&header_json)
            .map_err(|_| AuthError::invalid_token(CONTEXT, "header is not valid JSON"))?;
        if header.alg != ALGORITHM {
            return Err(AuthError::invalid_token(
                CONTEXT,
                format!("unsupported algorithm {}", header.alg),
            ));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| AuthError::invalid_token(CONTEXT, "signature is not base64url"))?;

        let mut mac = self.mac(CONTEXT)?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::invalid_token(CONTEXT, "signature mismatch"))?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| AuthError::invalid_token(CONTEXT, "claims are not base64url"))?;
        serde_json::from_slice(&claims_json)
            .map_err(|_| AuthError::invalid_token(CONTEXT, "claims are not valid JSON"))
    }

    fn mac(&self, context: &str) -> Result<HmacSha512> {
        if self.secret.is_empty() {
            return Err(AuthError::internal_msg(context, "signing secret is empty"));
        }
        HmacSha512::new_from_slice(&self.secret)
            .map_err(|e| AuthError::internal_msg(context, format!("invalid signing key: {e}")))
    }
}
