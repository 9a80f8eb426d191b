use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::error::AuthError;
use super::jwks::KeyResolver;
use super::SubjectId;

/// Claims this service relies on. Audience, issuer, expiry and not-before are
/// checked by `jsonwebtoken`; only what callers need is decoded here. Fields are
/// optional so a missing claim surfaces as a validation error, not a parse error.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Result of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: SubjectId,
    pub issuer: String,
    pub expires_at: DateTime<Utc>,
}

/// Validates bearer tokens against the configured issuer and audience
pub struct TokenVerifier {
    keys: Arc<dyn KeyResolver>,
    audience: String,
    issuer: String,
    leeway: Duration,
}

impl TokenVerifier {
    pub fn new(
        keys: Arc<dyn KeyResolver>,
        audience: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            audience: audience.into(),
            issuer: issuer.into(),
            leeway: Duration::ZERO,
        }
    }

    /// Clock skew tolerated on `exp` and `nbf`
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify a compact JWS and return its subject.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;

        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| AuthError::UnknownSigningKey("token header has no 'kid'".to_string()))?;

        let signing_key = self.keys.resolve(kid).await?;

        // Pin to the key's algorithm; the header's own `alg` is never trusted on its own.
        if header.alg != signing_key.algorithm {
            return Err(AuthError::UnsupportedAlgorithm);
        }

        let mut validation = Validation::new(signing_key.algorithm);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.leeway.as_secs();

        let data = decode::<TokenClaims>(token, &signing_key.key, &validation)?;
        let claims = data.claims;

        let subject = claims
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::MissingSubject)?;

        let expires_at = claims
            .exp
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
            .ok_or_else(|| AuthError::Invalid("exp claim out of range".to_string()))?;

        Ok(VerifiedToken {
            subject: SubjectId::new(subject),
            issuer: claims.iss.unwrap_or_else(|| self.issuer.clone()),
            expires_at,
        })
    }
}
