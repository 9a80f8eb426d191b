use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plans::PlanName;

/// Capability set derived from a subscription plan. Recomputed on every request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlements {
    pub max_goals: u32,
    /// `None` means logs are kept forever
    pub log_retention_days: Option<u32>,
    pub can_use_ai_excuse: bool,
    pub can_use_premium_templates: bool,
}

/// A downstream feature or limit check refused by the caller's plan
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntitlementDenied {
    #[error("Goal limit reached ({limit} on your current plan)")]
    GoalLimitReached { limit: u32 },

    #[error("AI excuses require a premium plan")]
    AiExcuseUnavailable,

    #[error("Premium templates require a premium plan")]
    PremiumTemplateUnavailable,
}

/// Map a stored plan name to its capability set.
///
/// Total: anything that is not a recognised paid plan gets the free policy.
pub fn resolve(plan: &str) -> Entitlements {
    match plan.parse::<PlanName>() {
        Ok(PlanName::Premium) => Entitlements::PREMIUM,
        Ok(PlanName::Free) | Err(_) => Entitlements::FREE,
    }
}

impl Entitlements {
    pub const FREE: Entitlements = Entitlements {
        max_goals: 3,
        log_retention_days: Some(30),
        can_use_ai_excuse: false,
        can_use_premium_templates: false,
    };

    pub const PREMIUM: Entitlements = Entitlements {
        max_goals: 100,
        log_retention_days: None,
        can_use_ai_excuse: true,
        can_use_premium_templates: true,
    };

    /// Oldest log date visible under this plan, or `None` when unrestricted
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.log_retention_days
            .map(|days| now - Duration::days(i64::from(days)))
    }

    /// Check before creating a goal; `current` is how many the caller already owns
    pub fn ensure_goal_capacity(&self, current: u64) -> Result<(), EntitlementDenied> {
        if current >= u64::from(self.max_goals) {
            return Err(EntitlementDenied::GoalLimitReached {
                limit: self.max_goals,
            });
        }
        Ok(())
    }

    pub fn ensure_ai_excuse(&self) -> Result<(), EntitlementDenied> {
        if self.can_use_ai_excuse {
            Ok(())
        } else {
            Err(EntitlementDenied::AiExcuseUnavailable)
        }
    }

    pub fn ensure_premium_templates(&self) -> Result<(), EntitlementDenied> {
        if self.can_use_premium_templates {
            Ok(())
        } else {
            Err(EntitlementDenied::PremiumTemplateUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn free_policy() {
        assert_eq!(
            resolve("free"),
            Entitlements {
                max_goals: 3,
                log_retention_days: Some(30),
                can_use_ai_excuse: false,
                can_use_premium_templates: false,
            }
        );
    }

    #[test]
    fn premium_policy() {
        assert_eq!(
            resolve("premium"),
            Entitlements {
                max_goals: 100,
                log_retention_days: None,
                can_use_ai_excuse: true,
                can_use_premium_templates: true,
            }
        );
    }

    #[test]
    fn unknown_plans_fall_back_to_free() {
        for name in ["bogus", "", "PREMIUM", "enterprise", " premium"] {
            assert_eq!(resolve(name), resolve("free"), "plan {:?}", name);
        }
    }

    #[test]
    fn serializes_with_api_field_names() {
        let value = serde_json::to_value(Entitlements::FREE).unwrap();
        assert_eq!(
            value,
            json!({
                "maxGoals": 3,
                "logRetentionDays": 30,
                "canUseAiExcuse": false,
                "canUsePremiumTemplates": false
            })
        );
        let premium = serde_json::to_value(Entitlements::PREMIUM).unwrap();
        assert!(premium["logRetentionDays"].is_null());
    }

    #[test]
    fn retention_cutoff_only_for_limited_plans() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            Entitlements::FREE.retention_cutoff(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(Entitlements::PREMIUM.retention_cutoff(now), None);
    }

    #[test]
    fn goal_ceiling_is_inclusive_of_existing_goals() {
        assert!(Entitlements::FREE.ensure_goal_capacity(2).is_ok());
        assert_eq!(
            Entitlements::FREE.ensure_goal_capacity(3),
            Err(EntitlementDenied::GoalLimitReached { limit: 3 })
        );
        assert!(Entitlements::PREMIUM.ensure_goal_capacity(99).is_ok());
        assert!(Entitlements::PREMIUM.ensure_goal_capacity(100).is_err());
    }

    #[test]
    fn feature_flags_gate_premium_features() {
        assert_eq!(
            Entitlements::FREE.ensure_ai_excuse(),
            Err(EntitlementDenied::AiExcuseUnavailable)
        );
        assert_eq!(
            Entitlements::FREE.ensure_premium_templates(),
            Err(EntitlementDenied::PremiumTemplateUnavailable)
        );
        assert!(Entitlements::PREMIUM.ensure_ai_excuse().is_ok());
        assert!(Entitlements::PREMIUM.ensure_premium_templates().is_ok());
    }
}
