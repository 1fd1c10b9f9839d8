use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    auth::claims::{Claims, SessionIdentity},
    config::JwtConfig,
    error::AppError,
    state::AppState,
};

/// Signing and verification keys for session credentials.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs(cfg.ttl_minutes.max(0) as u64 * 60),
        }
    }

    pub fn sign(&self, identity: &SessionIdentity) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            id: identity.id,
            email: identity.email.clone(),
            school_id: identity.school_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %identity.id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.id, "jwt verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.as_ref().clone()
    }
}

/// Caller identity taken from a valid `Authorization: Bearer` credential.
pub struct AuthUser(pub SessionIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("No token provided"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("No token provided"))?;

        match keys.verify(token) {
            Ok(claims) => Ok(AuthUser(claims.into())),
            Err(e) => {
                warn!(error = %e, "invalid or expired token");
                Err(AppError::unauthorized("Invalid token"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_keys(secret: &str, issuer: &str, audience: &str, ttl_minutes: i64) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes,
        })
    }

    fn identity() -> SessionIdentity {
        SessionIdentity {
            id: Uuid::new_v4(),
            email: "ann@uni.edu".into(),
            school_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn sign_and_verify_carries_identity() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud", 60 * 24 * 7);
        let who = identity();
        let token = keys.sign(&who).expect("sign");
        let claims = keys.verify(&token).expect("verify");

        assert_eq!(SessionIdentity::from(claims.clone()), who);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn payload_uses_camel_case_school_id() {
        let keys = make_keys("dev-secret", "iss", "aud", 5);
        let token = keys.sign(&identity()).unwrap();
        let claims = keys.verify(&token).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("schoolId").is_some());
        assert!(json.get("school_id").is_none());
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let good = make_keys("secret-a", "iss", "aud", 5);
        let bad = make_keys("secret-b", "iss", "aud", 5);
        let token = good.sign(&identity()).unwrap();
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud", 5);
        let bad = make_keys("same-secret", "bad-iss", "bad-aud", 5);
        let token = good.sign(&identity()).unwrap();
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys("dev-secret", "iss", "aud", 5);
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            id: Uuid::new_v4(),
            email: "ann@uni.edu".into(),
            school_id: Uuid::new_v4(),
            iat: now - 7200,
            exp: now - 3600,
            iss: "iss".into(),
            aud: "aud".into(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }
}
