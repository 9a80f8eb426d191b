pub mod error;
pub mod jwks;
pub mod verifier;

use serde::{Deserialize, Serialize};

pub use error::{AuthError, JwksParseError, KeyError};
pub use jwks::{JwksKeyResolver, KeyResolver, KeySet, SigningKey};
pub use verifier::{TokenVerifier, VerifiedToken};

/// Opaque identity of an authenticated caller, taken from a verified token's `sub` claim.
///
/// Only the token verifier constructs these in request handling; anything that holds
/// one can assume it came from a token that passed signature and claim checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
