//! Access-token verification.
//!
//! Tokens are issued upstream; this layer only verifies the signature and
//! expiry and extracts the `sub` claim as the `user_id`. No token is ever
//! minted here.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::domain::errors::{CoreError, CoreResult};

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify a bearer token and return the authenticated `user_id`.
    pub fn verify(&self, token: &str) -> CoreResult<String> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| CoreError::Unauthenticated(format!("invalid token: {e}")))?;
        if data.claims.sub.is_empty() {
            return Err(CoreError::Unauthenticated("token has no subject".to_string()));
        }
        Ok(data.claims.sub)
    }
}
