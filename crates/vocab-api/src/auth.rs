use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Claims carried by sync bearer tokens. `sub` is the account id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncClaims {
    pub sub: String,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verifies HS256 tokens signed with the shared sync secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    clock_skew: std::time::Duration,
}

impl JwtVerifier {
    pub fn new(config: &AppConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = config.auth_clock_skew.as_secs();
        if let Some(issuer) = config.jwt_issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            clock_skew: config.auth_clock_skew,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let decoded = decode::<SyncClaims>(token, &self.key, &self.validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;

        let user_id = decoded.claims.sub.trim();
        if user_id.is_empty() {
            return Err(AppError::unauthorized("Token subject is missing"));
        }
        validate_temporal_claims(&decoded.claims, self.clock_skew)?;

        Ok(AuthenticatedUser {
            user_id: user_id.to_string(),
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

fn validate_temporal_claims(
    claims: &SyncClaims,
    clock_skew: std::time::Duration,
) -> Result<(), AppError> {
    let now = chrono::Utc::now().timestamp();
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);

    let exp = claims
        .exp
        .ok_or_else(|| AppError::unauthorized("Token missing `exp` claim"))?;
    if exp <= now.saturating_sub(skew) {
        return Err(AppError::unauthorized("Token is expired"));
    }

    let iat = claims
        .iat
        .ok_or_else(|| AppError::unauthorized("Token missing `iat` claim"))?;
    if iat > now.saturating_add(skew) {
        return Err(AppError::unauthorized("Token `iat` is in the future"));
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now.saturating_add(skew) {
            return Err(AppError::unauthorized("Token is not yet valid"));
        }
    }

    Ok(())
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn verifier(issuer: Option<&str>) -> JwtVerifier {
        let mut map = HashMap::from([("SYNC_JWT_SECRET", SECRET)]);
        if let Some(issuer) = issuer {
            map.insert("SYNC_JWT_ISSUER", issuer);
        }
        let config =
            AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap();
        JwtVerifier::new(&config)
    }

    fn token(claims: &SyncClaims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(sub: &str) -> SyncClaims {
        let now = chrono::Utc::now().timestamp();
        SyncClaims {
            sub: sub.to_string(),
            exp: Some(now + 300),
            iat: Some(now),
            nbf: None,
            iss: None,
        }
    }

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn verify_accepts_valid_token() {
        let user = verifier(None)
            .verify(&token(&claims("user-a"), SECRET))
            .unwrap();
        assert_eq!(user.user_id, "user-a");
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let forged = token(&claims("user-a"), "ffffffffffffffffffffffffffffffff");
        assert!(verifier(None).verify(&forged).is_err());
    }

    #[test]
    fn verify_rejects_blank_subject() {
        assert!(verifier(None).verify(&token(&claims("  "), SECRET)).is_err());
    }

    #[test]
    fn verify_checks_issuer_when_configured() {
        let verifier = verifier(Some("vocab"));
        assert!(verifier.verify(&token(&claims("user-a"), SECRET)).is_err());

        let mut issued = claims("user-a");
        issued.iss = Some("vocab".to_string());
        assert!(verifier.verify(&token(&issued, SECRET)).is_ok());
    }

    #[test]
    fn temporal_claims_require_exp_and_iat() {
        let claims = SyncClaims {
            sub: "user".to_string(),
            exp: None,
            iat: None,
            nbf: None,
            iss: None,
        };
        let err =
            validate_temporal_claims(&claims, std::time::Duration::from_secs(60)).unwrap_err();
        assert!(err.to_string().contains("missing `exp`"));
    }

    #[test]
    fn temporal_claims_reject_future_iat() {
        let now = chrono::Utc::now().timestamp();
        let claims = SyncClaims {
            sub: "user".to_string(),
            exp: Some(now + 300),
            iat: Some(now + 120),
            nbf: None,
            iss: None,
        };
        let err =
            validate_temporal_claims(&claims, std::time::Duration::from_secs(30)).unwrap_err();
        assert!(err.to_string().contains("future"));
    }
}
