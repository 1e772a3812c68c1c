use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Claims carried by the identity provider's session token.
///
/// `sub` is the provider's opaque subject, the token identifier that
/// links a session to a user record. It is the only claim the backend
/// keys off; everything else about the user lives in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(token_identifier: impl Into<String>, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: token_identifier.into(),
            iat: now,
            exp: now + duration_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// The authenticated caller, as established by the bearer-token extractor.
///
/// Holds only the token identifier; handlers that need the full user
/// record resolve it against the users table themselves.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub token_identifier: String,
}

impl From<Claims> for AuthIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            token_identifier: claims.sub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_claims_are_not_expired() {
        let claims = Claims::new("oauth|user_1", 3600);
        assert!(!claims.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let mut claims = Claims::new("oauth|user_1", 3600);
        claims.exp = Utc::now().timestamp() - 10;
        assert!(claims.is_expired());
    }
}
