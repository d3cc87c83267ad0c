use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::config::Config;
use crate::database::schema::{Id, User};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Invalid session; Invalid signature")]
    InvalidSignature,
    #[error("Invalid session; Token expired")]
    Expired,
    #[error("Invalid session; Malformed claims")]
    MalformedClaims,
    #[error("Invalid session; Unexpected issuer")]
    InvalidIssuer,
    #[error("Invalid session; Unexpected audience")]
    InvalidAudience,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub email: String,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// The caller identity extracted from a valid token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub email: String,
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            email: value.email,
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    key: Hmac<Sha256>,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        issuer: &str,
        audience: &str,
        lifetime: Duration,
    ) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            key: Hmac::new_from_slice(secret)?,
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
            lifetime,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, hmac::digest::InvalidLength> {
        Self::new(
            config.jwt_key.as_bytes(),
            &config.jwt_issuer,
            &config.jwt_audience,
            Duration::days(config.jwt_lifetime_days),
        )
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = JwtSessionData {
            user_id: user.id,
            username: user.username.to_owned(),
            email: user.email.to_owned(),
            iss: self.issuer.to_owned(),
            aud: self.audience.to_owned(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        claims.sign_with_key(&self.key).map_err(|e| {
            log::error!("Failed to sign session token: {e}");
            AuthError::MalformedClaims
        })
    }

    pub fn validate(&self, token: &str) -> Result<SessionData, AuthError> {
        self.validate_at(token, Utc::now())
    }

    /// No clock skew is tolerated: a token is dead from its `exp` second on.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionData, AuthError> {
        let verified: Result<JwtSessionData, jwt::Error> = token.verify_with_key(&self.key);
        let session = match verified {
            Ok(session) => session,
            Err(jwt::Error::InvalidSignature | jwt::Error::RustCryptoMac(_)) => {
                return Err(AuthError::InvalidSignature)
            }
            Err(_) => return Err(AuthError::MalformedClaims),
        };

        if session.iss != self.issuer {
            return Err(AuthError::InvalidIssuer);
        }
        if session.aud != self.audience {
            return Err(AuthError::InvalidAudience);
        }
        if session.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(session.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "alice".to_owned(),
            email: "alice@example.com".to_owned(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service() -> TokenService {
        TokenService::new(b"test-secret", "RecipeApi", "RecipeApiUsers", Duration::days(7)).unwrap()
    }

    #[test]
    fn issued_token_is_accepted_immediately() {
        let tokens = service();
        let token = tokens.issue(&user()).unwrap();

        let session = tokens.validate(&token).unwrap();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "alice");
        assert_eq!(session.email, "alice@example.com");
    }

    #[test]
    fn token_is_rejected_after_expiry() {
        let tokens = service();
        let issued = Utc::now();
        let token = tokens.issue_at(&user(), issued).unwrap();

        let just_before = issued + Duration::days(7) - Duration::seconds(1);
        assert!(tokens.validate_at(&token, just_before).is_ok());

        let at_expiry = issued + Duration::days(7);
        assert_eq!(
            tokens.validate_at(&token, at_expiry),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn foreign_key_signature_is_rejected() {
        let token = service().issue(&user()).unwrap();
        let other =
            TokenService::new(b"other-secret", "RecipeApi", "RecipeApiUsers", Duration::days(7))
                .unwrap();

        assert_eq!(other.validate(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn issuer_and_audience_are_checked() {
        let token = service().issue(&user()).unwrap();

        let wrong_issuer =
            TokenService::new(b"test-secret", "Elsewhere", "RecipeApiUsers", Duration::days(7))
                .unwrap();
        assert_eq!(wrong_issuer.validate(&token), Err(AuthError::InvalidIssuer));

        let wrong_audience =
            TokenService::new(b"test-secret", "RecipeApi", "Others", Duration::days(7)).unwrap();
        assert_eq!(
            wrong_audience.validate(&token),
            Err(AuthError::InvalidAudience)
        );
    }

    #[test]
    fn swapped_payload_fails_signature_check() {
        let tokens = service();
        let alice = tokens.issue(&user()).unwrap();
        let mallory = tokens
            .issue(&User {
                id: 8,
                username: "mallory".to_owned(),
                ..user()
            })
            .unwrap();

        let alice: Vec<&str> = alice.split('.').collect();
        let mallory: Vec<&str> = mallory.split('.').collect();
        let forged = format!("{}.{}.{}", alice[0], mallory[1], alice[2]);

        assert_eq!(tokens.validate(&forged), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            service().validate("not-a-token"),
            Err(AuthError::MalformedClaims)
        );
    }
}
