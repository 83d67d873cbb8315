use crate::config::SecurityConfig;
use crate::error::Error;
use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

pub mod auth;

pub use auth::AuthUser;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (numeric user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

impl Claims {
    /// Get the user ID from the claims
    pub fn user_id(&self) -> Result<i64, Error> {
        self.sub
            .parse::<i64>()
            .map_err(|e| Error::Authentication(format!("Invalid user ID in token: {}", e)))
    }
}

/// Token issuing and validation. Sessions themselves are owned by the
/// account service; this side only checks bearer tokens.
pub struct SecurityService {
    config: SecurityConfig,
}

impl SecurityService {
    /// Create a new security service
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Generate a JWT token for a user
    pub fn generate_token(&self, user_id: i64) -> Result<String> {
        let now = Utc::now();
        let expiration = now + Duration::minutes(self.config.jwt_expiration_minutes as i64);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Authentication(format!("Failed to generate JWT token: {}", e)))?;

        Ok(token)
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>, Error> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| Error::Authentication(format!("Invalid token: {}", e)))
    }

    /// Validate a token and return the user it was issued for
    pub fn authenticate(&self, token: &str) -> Result<i64, Error> {
        let token_data = self.validate_token(token)?;
        token_data.claims.user_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> SecurityService {
        SecurityService::new(SecurityConfig {
            jwt_secret: secret.to_string(),
            jwt_expiration_minutes: 5,
        })
    }

    #[test]
    fn token_round_trips_user_id() {
        let security = service("s3cret");
        let token = security.generate_token(42).unwrap();
        assert_eq!(security.authenticate(&token).unwrap(), 42);
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let token = service("one").generate_token(42).unwrap();
        assert!(matches!(
            service("two").authenticate(&token),
            Err(Error::Authentication(_))
        ));
    }
}
