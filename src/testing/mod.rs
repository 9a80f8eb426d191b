//! Test doubles shared by the unit tests: fixture keys and token minting,
//! a static key resolver, and an in-memory plan repository.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::auth::{KeyError, KeyResolver, KeySet, SigningKey, SubjectId};
use crate::plans::{PlanName, PlanRecord, PlanRepository, RepositoryError};

pub const AUDIENCE: &str = "https://api.what-went-wrong.test";
pub const ISSUER: &str = "https://tenant.auth.test/";
pub const TRUSTED_KID: &str = "trusted-key";

const TRUSTED_PEM: &str = include_str!("../../tests/fixtures/trusted_rsa.pem");
const FOREIGN_PEM: &str = include_str!("../../tests/fixtures/foreign_rsa.pem");
const TRUSTED_JWKS: &str = include_str!("../../tests/fixtures/trusted_jwks.json");

/// Claims that pass verification against `AUDIENCE` and `ISSUER`
pub fn claims_for(subject: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": subject,
        "aud": AUDIENCE,
        "iss": ISSUER,
        "iat": now,
        "exp": now + 3600,
    })
}

fn sign(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture key");
    encode(&header, claims, &key).expect("sign token")
}

/// Token signed with the key published in the trusted fixture key set
pub fn mint_token(kid: &str, claims: &Value) -> String {
    sign(TRUSTED_PEM, Some(kid), claims)
}

/// Token signed with a key nobody published
pub fn mint_foreign_token(kid: &str, claims: &Value) -> String {
    sign(FOREIGN_PEM, Some(kid), claims)
}

pub fn mint_token_without_kid(claims: &Value) -> String {
    sign(TRUSTED_PEM, None, claims)
}

/// HS256 token keyed with the published key set itself, the classic algorithm-confusion forgery
pub fn mint_hmac_token(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_secret(TRUSTED_JWKS.as_bytes());
    encode(&header, claims, &key).expect("sign token")
}

/// Fixed key set, no network
pub struct StaticKeyResolver {
    keys: KeySet,
}

impl StaticKeyResolver {
    pub fn trusted() -> Self {
        Self {
            keys: KeySet::from_jwks_slice(TRUSTED_JWKS.as_bytes()).expect("fixture JWKS"),
        }
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, kid: &str) -> Result<SigningKey, KeyError> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyError::KeyNotFound(kid.to_string()))
    }
}

/// In-memory `PlanRepository` honouring the same uniqueness rule as the
/// `user_plans` primary key, with knobs for simulating races and outages.
#[derive(Default)]
pub struct MemoryPlanRepository {
    rows: Mutex<HashMap<String, PlanRecord>>,
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    always_fail: AtomicBool,
    hidden_finds: AtomicUsize,
    hidden_updates: AtomicUsize,
}

impl MemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a row directly, bypassing call accounting
    pub fn seed(&self, subject: &str, plan: &str) {
        self.rows.lock().unwrap().insert(
            subject.to_string(),
            PlanRecord {
                subject_id: subject.to_string(),
                plan: plan.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn plan_of(&self, subject: &str) -> Option<String> {
        self.rows.lock().unwrap().get(subject).map(|r| r.plan.clone())
    }

    /// Repository operations attempted so far, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next `n` operations with a transient error
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_always(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` finds miss, as if another request inserted the row just after our read
    pub fn hide_next_finds(&self, n: usize) {
        self.hidden_finds.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` updates see no row
    pub fn hide_next_updates(&self, n: usize) {
        self.hidden_updates.store(n, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave between statements
        tokio::task::yield_now().await;

        if self.always_fail.load(Ordering::SeqCst) || take_one(&self.failures_remaining) {
            return Err(RepositoryError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl PlanRepository for MemoryPlanRepository {
    async fn find(&self, subject: &SubjectId) -> Result<Option<PlanRecord>, RepositoryError> {
        self.enter().await?;
        if take_one(&self.hidden_finds) {
            return Ok(None);
        }
        Ok(self.rows.lock().unwrap().get(subject.as_str()).cloned())
    }

    async fn insert(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<PlanRecord, RepositoryError> {
        self.enter().await?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(subject.as_str()) {
            return Err(RepositoryError::Duplicate);
        }
        let record = PlanRecord {
            subject_id: subject.as_str().to_string(),
            plan: plan.as_str().to_string(),
            updated_at: Utc::now(),
        };
        rows.insert(record.subject_id.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<Option<PlanRecord>, RepositoryError> {
        self.enter().await?;
        if take_one(&self.hidden_updates) {
            return Ok(None);
        }
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(subject.as_str()).map(|record| {
            record.plan = plan.as_str().to_string();
            record.updated_at = Utc::now();
            record.clone()
        }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}
