#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use what_went_wrong_api::auth::SubjectId;
use what_went_wrong_api::config::JwksConfig;
use what_went_wrong_api::plans::{PlanName, PlanRecord, PlanRepository, RepositoryError};

pub const AUDIENCE: &str = "https://api.what-went-wrong.test";
pub const ISSUER: &str = "https://tenant.auth.test/";
pub const TRUSTED_KID: &str = "trusted-key";
pub const FOREIGN_KID: &str = "foreign-key";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

pub const TRUSTED_JWKS: &str = include_str!("../fixtures/trusted_jwks.json");
pub const FOREIGN_JWKS: &str = include_str!("../fixtures/foreign_jwks.json");
const TRUSTED_PEM: &str = include_str!("../fixtures/trusted_rsa.pem");
const FOREIGN_PEM: &str = include_str!("../fixtures/foreign_rsa.pem");

/// Both fixture keys published together, as after a key rotation
pub fn rotated_jwks() -> String {
    let mut keys = Vec::new();
    for doc in [TRUSTED_JWKS, FOREIGN_JWKS] {
        let parsed: Value = serde_json::from_str(doc).expect("fixture JWKS");
        keys.extend(parsed["keys"].as_array().cloned().unwrap_or_default());
    }
    json!({ "keys": keys }).to_string()
}

pub fn jwks_config(min_refresh_interval_secs: u64) -> JwksConfig {
    JwksConfig {
        refresh_interval_secs: 3600,
        min_refresh_interval_secs,
        http_timeout_secs: 5,
    }
}

pub fn claims_for(subject: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "sub": subject,
        "aud": AUDIENCE,
        "iss": ISSUER,
        "iat": now,
        "exp": now + 3600,
    })
}

fn sign(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture key");
    encode(&header, claims, &key).expect("sign token")
}

pub fn trusted_token(subject: &str) -> String {
    sign(TRUSTED_PEM, TRUSTED_KID, &claims_for(subject))
}

pub fn foreign_token(subject: &str) -> String {
    sign(FOREIGN_PEM, FOREIGN_KID, &claims_for(subject))
}

/// Minimal map-backed repository for wiring the router without Postgres
#[derive(Default)]
pub struct InMemoryPlans {
    rows: Mutex<HashMap<String, PlanRecord>>,
}

#[async_trait]
impl PlanRepository for InMemoryPlans {
    async fn find(&self, subject: &SubjectId) -> Result<Option<PlanRecord>, RepositoryError> {
        Ok(self.rows.lock().unwrap().get(subject.as_str()).cloned())
    }

    async fn insert(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<PlanRecord, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(subject.as_str()) {
            return Err(RepositoryError::Duplicate);
        }
        let record = PlanRecord {
            subject_id: subject.as_str().to_string(),
            plan: plan.as_str().to_string(),
            updated_at: chrono::Utc::now(),
        };
        rows.insert(record.subject_id.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<Option<PlanRecord>, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(subject.as_str()).map(|record| {
            record.plan = plan.as_str().to_string();
            record.updated_at = chrono::Utc::now();
            record.clone()
        }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
