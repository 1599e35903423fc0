use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod apikey;
pub mod gate;
pub mod rbac;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("password hash error: {0}")]
    PasswordHash(String),
}

/// Claims carried by a staff session token.
///
/// `step_up_exp` is only present on tokens issued through the step-up
/// endpoint; it marks how long the fresh credential proof remains valid.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_up_exp: Option<i64>,
}

impl Claims {
    pub fn new(staff_id: Uuid, expiry_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: staff_id,
            exp: (now + Duration::minutes(expiry_minutes)).timestamp(),
            iat: now.timestamp(),
            step_up_exp: None,
        }
    }

    /// Same session lifetime, plus a short step-up window starting now.
    pub fn with_step_up(staff_id: Uuid, expiry_minutes: i64, step_up_minutes: i64) -> Self {
        let mut claims = Self::new(staff_id, expiry_minutes);
        claims.step_up_exp = Some((Utc::now() + Duration::minutes(step_up_minutes)).timestamp());
        claims
    }

    pub fn step_up_until(&self) -> Option<DateTime<Utc>> {
        self.step_up_exp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }
}

/// Claims minted when a staff member impersonates a platform user. The
/// token is consumed by the platform frontend, not by this API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImpersonationClaims {
    pub sub: String,
    pub impersonation: bool,
    pub staff_id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl ImpersonationClaims {
    pub fn new(user_id: i32, staff_id: Uuid, expiry_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            impersonation: true,
            staff_id,
            exp: (now + Duration::minutes(expiry_minutes)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn generate_token<T: Serialize>(claims: &T, secret: &str) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::TokenGeneration("empty JWT secret".to_string()));
    }
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::InvalidToken("JWT secret not configured".to_string()));
    }
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AuthError::InvalidToken(format!("Invalid or expired token: {}", e)))?;
    Ok(data.claims)
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| AuthError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn token_round_trip() {
        let staff_id = Uuid::new_v4();
        let token = generate_token(&Claims::new(staff_id, 60), SECRET).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, staff_id);
        assert!(claims.step_up_exp.is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(&Claims::new(Uuid::new_v4(), 60), SECRET).unwrap();
        assert!(validate_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), 60);
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        let token = generate_token(&claims, SECRET).unwrap();
        assert!(validate_token(&token, SECRET).is_err());
    }

    #[test]
    fn step_up_claims_carry_window() {
        let claims = Claims::with_step_up(Uuid::new_v4(), 60, 10);
        let until = claims.step_up_until().unwrap();
        assert!(until > Utc::now());
        assert!(until <= Utc::now() + Duration::minutes(11));
    }

    #[test]
    fn password_hash_verifies() {
        let hashed = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hashed));
        assert!(!verify_password("hunter3", &hashed));
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
    }
}
