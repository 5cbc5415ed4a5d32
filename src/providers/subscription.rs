//! Subscription tier resolution for quota checks

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::PlanConfig;
use crate::error::{Error, Result};
use crate::types::Tier;

/// Resolves a user's subscription tier
#[async_trait]
pub trait SubscriptionResolver: Send + Sync {
    async fn tier_for(&self, user_id: &str) -> Result<Tier>;
}

/// Tier resolution from static configuration: per-user plan overrides
/// on top of a default plan
pub struct ConfigSubscriptions {
    default_plan: String,
    limits: HashMap<String, usize>,
    users: HashMap<String, String>,
}

impl ConfigSubscriptions {
    pub fn from_config(config: &PlanConfig) -> Result<Self> {
        if !config.limits.contains_key(&config.default_plan) {
            return Err(Error::Config(format!(
                "default plan '{}' has no limits entry",
                config.default_plan
            )));
        }

        Ok(Self {
            default_plan: config.default_plan.clone(),
            limits: config
                .limits
                .iter()
                .map(|(name, l)| (name.clone(), l.max_units))
                .collect(),
            users: config.users.clone(),
        })
    }
}

#[async_trait]
impl SubscriptionResolver for ConfigSubscriptions {
    async fn tier_for(&self, user_id: &str) -> Result<Tier> {
        let plan = self
            .users
            .get(user_id)
            .unwrap_or(&self.default_plan)
            .clone();

        let max_units = match self.limits.get(&plan) {
            Some(max) => *max,
            None => {
                tracing::warn!(
                    "user {} assigned unknown plan '{}', using default",
                    user_id,
                    plan
                );
                self.limits[&self.default_plan]
            }
        };

        Ok(Tier { plan, max_units })
    }
}
