use thiserror::Error;

/// Errors from resolving signing keys
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Signing key not found: {0}")]
    KeyNotFound(String),

    #[error("Failed to fetch key set from {url}: {reason}")]
    Fetch { url: String, reason: String },
}

/// A key set document that is not a JWKS at all. Individual unusable keys are skipped, not errors.
#[derive(Debug, Error)]
#[error("invalid JWKS document: {0}")]
pub struct JwksParseError(#[from] serde_json::Error);

/// Why a bearer credential was refused.
///
/// Every variant maps to a 401. `reason()` is the stable, client-safe description;
/// the `Display` form may carry more context and is meant for server logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingCredentials,

    #[error("Authorization header must use the 'Bearer <token>' format")]
    InvalidAuthorizationHeader,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Signing key could not be resolved: {0}")]
    UnknownSigningKey(String),

    #[error("Token algorithm not accepted for this key")]
    UnsupportedAlgorithm,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Invalid audience")]
    InvalidAudience,

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Token has no subject claim")]
    MissingSubject,

    #[error("Invalid token: {0}")]
    Invalid(String),
}

impl AuthError {
    /// Client-facing failure reason. Never includes token contents or key material.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidAuthorizationHeader => {
                "missing or invalid Authorization header"
            }
            AuthError::MalformedToken(_) => "malformed token",
            AuthError::UnknownSigningKey(_) => "signing key not found",
            AuthError::UnsupportedAlgorithm => "unsupported algorithm",
            AuthError::InvalidSignature => "invalid signature",
            AuthError::Expired => "token has expired",
            AuthError::NotYetValid => "token not yet valid",
            AuthError::InvalidAudience => "invalid audience",
            AuthError::InvalidIssuer => "invalid issuer",
            AuthError::MissingSubject => "missing subject claim",
            AuthError::Invalid(_) => "invalid token",
        }
    }

    /// True when the header itself was unusable and no verification was attempted
    pub fn is_header_error(&self) -> bool {
        matches!(
            self,
            AuthError::MissingCredentials | AuthError::InvalidAuthorizationHeader
        )
    }
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::KeyNotFound(kid) => AuthError::UnknownSigningKey(kid),
            // Whatever the cause, an unresolvable key means the signature cannot be trusted
            KeyError::Fetch { url, reason } => {
                AuthError::UnknownSigningKey(format!("key set unavailable ({}): {}", url, reason))
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::ImmatureSignature => AuthError::NotYetValid,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm,
            ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "aud" => AuthError::InvalidAudience,
                "iss" => AuthError::InvalidIssuer,
                "sub" => AuthError::MissingSubject,
                other => AuthError::Invalid(format!("missing required claim '{}'", other)),
            },
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::MalformedToken(err.to_string()),
            _ => AuthError::Invalid(err.to_string()),
        }
    }
}
