use arc_swap::ArcSwap;
use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use super::error::{JwksParseError, KeyError};
use crate::config::JwksConfig;

/// A verification key pinned to the single algorithm it may be used with
#[derive(Clone)]
pub struct SigningKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of a published key set, indexed by `kid`
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
}

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

impl KeySet {
    /// Parse a JWKS document. Keys that cannot be used for signature verification
    /// are skipped individually rather than failing the whole document.
    pub fn from_jwks_slice(body: &[u8]) -> Result<Self, JwksParseError> {
        let raw: RawKeySet = serde_json::from_slice(body)?;

        let mut keys = HashMap::with_capacity(raw.keys.len());
        for value in raw.keys {
            let jwk: Jwk = match serde_json::from_value(value) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!("Skipping unparsable JWK: {}", e);
                    continue;
                }
            };

            let Some(kid) = jwk.common.key_id.clone() else {
                warn!("Skipping JWK without 'kid'");
                continue;
            };

            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                debug!("Skipping encryption key '{}'", kid);
                continue;
            }

            let Some(algorithm) = pinned_algorithm(&jwk) else {
                warn!("Skipping JWK '{}': unsupported key type or algorithm", kid);
                continue;
            };

            match DecodingKey::from_jwk(&jwk) {
                Ok(key) => {
                    keys.insert(kid, SigningKey { key, algorithm });
                }
                Err(e) => warn!("Skipping JWK '{}': {}", kid, e),
            }
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Asymmetric algorithms only; a shared secret has no business in a public key set.
fn pinned_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
        return None;
    }

    if let Some(declared) = &jwk.common.key_algorithm {
        return match declared {
            KeyAlgorithm::RS256 => Some(Algorithm::RS256),
            KeyAlgorithm::RS384 => Some(Algorithm::RS384),
            KeyAlgorithm::RS512 => Some(Algorithm::RS512),
            KeyAlgorithm::PS256 => Some(Algorithm::PS256),
            KeyAlgorithm::PS384 => Some(Algorithm::PS384),
            KeyAlgorithm::PS512 => Some(Algorithm::PS512),
            KeyAlgorithm::ES256 => Some(Algorithm::ES256),
            KeyAlgorithm::ES384 => Some(Algorithm::ES384),
            KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
            _ => None,
        };
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Source of verification keys, looked up by the `kid` in a token header
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str) -> Result<SigningKey, KeyError>;
}

/// Key resolver backed by a remote JWKS endpoint.
///
/// Readers load the current snapshot lock-free; refreshes build a complete new
/// `KeySet` and swap it in, so a reader never sees a partially updated set.
/// Refreshes (background or on an unknown `kid`) are serialized behind one mutex.
pub struct JwksKeyResolver {
    url: Url,
    client: reqwest::Client,
    keys: ArcSwap<KeySet>,
    last_refresh: Mutex<Instant>,
    min_refresh_interval: Duration,
}

impl JwksKeyResolver {
    /// Fetch the key set once and build the resolver.
    ///
    /// Fails if the endpoint is unreachable, returns garbage, or publishes no usable keys;
    /// the server must not start without keys to verify against.
    pub async fn discover(url: Url, config: &JwksConfig) -> Result<Self, KeyError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| KeyError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let initial = fetch_key_set(&client, &url).await?;
        info!("Loaded {} signing key(s) from {}", initial.len(), url);

        Ok(Self {
            url,
            client,
            keys: ArcSwap::from_pointee(initial),
            last_refresh: Mutex::new(Instant::now()),
            min_refresh_interval: config.min_refresh_interval(),
        })
    }

    pub fn key_ids(&self) -> Vec<String> {
        self.keys.load().key_ids()
    }

    /// Re-fetch the key set and swap it in. On failure the previous set stays active.
    pub async fn refresh(&self) -> Result<usize, KeyError> {
        let mut last_refresh = self.last_refresh.lock().await;
        *last_refresh = Instant::now();
        self.fetch_and_store().await
    }

    async fn fetch_and_store(&self) -> Result<usize, KeyError> {
        let set = fetch_key_set(&self.client, &self.url).await?;
        let count = set.len();
        self.keys.store(Arc::new(set));
        info!("Refreshed signing keys from {} ({} key(s))", self.url, count);
        Ok(count)
    }

    /// One rate-limited refresh attempt for a `kid` not present in the current snapshot.
    async fn refresh_for_unknown_kid(&self, kid: &str) {
        let mut last_refresh = self.last_refresh.lock().await;

        // Another task may have refreshed while we waited for the lock
        if self.keys.load().contains(kid) {
            return;
        }

        if last_refresh.elapsed() < self.min_refresh_interval {
            debug!("Unknown kid '{}' but key set was refreshed recently; not refetching", kid);
            return;
        }

        *last_refresh = Instant::now();
        if let Err(e) = self.fetch_and_store().await {
            warn!(
                "Key set refresh for unknown kid '{}' failed, keeping last-known keys: {}",
                kid, e
            );
        }
    }

    /// Periodically refresh the key set until the returned handle is aborted.
    pub fn spawn_refresh(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        let every = every.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; keys were just loaded by discover()
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!("Scheduled key set refresh failed, keeping last-known keys: {}", e);
                }
            }
        })
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn resolve(&self, kid: &str) -> Result<SigningKey, KeyError> {
        if let Some(key) = self.keys.load().get(kid) {
            return Ok(key.clone());
        }

        self.refresh_for_unknown_kid(kid).await;

        self.keys
            .load()
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyError::KeyNotFound(kid.to_string()))
    }
}

async fn fetch_key_set(client: &reqwest::Client, url: &Url) -> Result<KeySet, KeyError> {
    let fetch_error = |reason: String| KeyError::Fetch {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_error(e.to_string()))?;

    let body = response.bytes().await.map_err(|e| fetch_error(e.to_string()))?;

    let set = KeySet::from_jwks_slice(&body).map_err(|e| fetch_error(e.to_string()))?;
    if set.is_empty() {
        return Err(fetch_error("key set contains no usable signing keys".to_string()));
    }
    Ok(set)
}
