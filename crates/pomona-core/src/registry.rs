//! Source registry: catalog entries from `sources.toml` layered with operator
//! policy overrides held in an explicit TTL cache.
//!
//! The registry is built once per process and handed by reference to the
//! coordinator at the start of each invocation. Overrides are reloaded from
//! the store only when the cache is older than its TTL.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{SourceEntry, SourcePolicy, SourcesConfig};
use crate::error::AppError;
use crate::traits::PolicyStore;

/// Operator-supplied changes to a source's policy. `None` fields leave the
/// configured value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    pub source: String,
    pub enabled: Option<bool>,
    pub max_pages_per_run: Option<u32>,
    pub max_age_days: Option<u32>,
    pub cooldown_minutes: Option<u32>,
    pub reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PolicyOverride {
    pub fn apply(&self, policy: &mut SourcePolicy) {
        if let Some(enabled) = self.enabled {
            policy.enabled = enabled;
        }
        if let Some(pages) = self.max_pages_per_run {
            policy.max_pages_per_run = pages.max(1);
        }
        if let Some(days) = self.max_age_days {
            policy.max_age_days = days;
        }
        if let Some(minutes) = self.cooldown_minutes {
            policy.cooldown_minutes = Some(minutes);
        }
    }
}

/// In-memory copy of the override table with a load timestamp.
#[derive(Debug, Clone)]
pub struct PolicyCache {
    overrides: HashMap<String, PolicyOverride>,
    loaded_at: Option<DateTime<Utc>>,
    ttl: TimeDelta,
}

impl Default for PolicyCache {
    fn default() -> Self {
        Self::new(TimeDelta::minutes(5))
    }
}

impl PolicyCache {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            overrides: HashMap::new(),
            loaded_at: None,
            ttl,
        }
    }

    /// True when the cache has never been loaded or is older than its TTL.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.loaded_at.is_none_or(|loaded| now - loaded >= self.ttl)
    }

    pub fn replace(&mut self, overrides: Vec<PolicyOverride>, now: DateTime<Utc>) {
        self.overrides = overrides
            .into_iter()
            .map(|o| (o.source.to_lowercase(), o))
            .collect();
        self.loaded_at = Some(now);
    }

    /// Forces the next refresh to hit the store.
    pub fn invalidate(&mut self) {
        self.loaded_at = None;
    }

    pub fn get(&self, slug: &str) -> Option<&PolicyOverride> {
        self.overrides.get(&slug.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// A catalog entry paired with its effective policy for one invocation.
#[derive(Debug, Clone)]
pub struct RegisteredSource {
    pub entry: SourceEntry,
    pub policy: SourcePolicy,
}

impl RegisteredSource {
    pub fn slug(&self) -> &str {
        &self.entry.slug
    }
}

/// Catalog of sources and their effective policies.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    config: SourcesConfig,
    cache: PolicyCache,
}

impl SourceRegistry {
    /// Builds a registry from a validated catalog.
    pub fn new(config: SourcesConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            config,
            cache: PolicyCache::default(),
        })
    }

    pub fn with_cache_ttl(mut self, ttl: TimeDelta) -> Self {
        self.cache = PolicyCache::new(ttl);
        self
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.config.sources
    }

    pub fn find(&self, slug: &str) -> Option<&SourceEntry> {
        self.config.find_by_slug(slug)
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.cache
    }

    /// Configured policy with any operator override applied.
    pub fn policy(&self, entry: &SourceEntry) -> SourcePolicy {
        let mut policy = entry.policy();
        if let Some(o) = self.cache.get(&entry.slug) {
            o.apply(&mut policy);
        }
        policy
    }

    /// Resolves which sources an invocation runs.
    ///
    /// A requested slug is returned even when disabled, so operators can run a
    /// disabled source by hand. Without a slug, only enabled sources are returned.
    pub fn select(&self, requested: Option<&str>) -> Result<Vec<RegisteredSource>, AppError> {
        match requested {
            Some(slug) => {
                let entry = self
                    .find(slug)
                    .ok_or_else(|| AppError::SourceNotFound(slug.to_string()))?;
                let policy = self.policy(entry);
                if !policy.enabled {
                    tracing::info!(source = %entry.slug, "Running source that is disabled by policy");
                }
                Ok(vec![RegisteredSource {
                    entry: entry.clone(),
                    policy,
                }])
            }
            None => Ok(self
                .config
                .sources
                .iter()
                .map(|entry| RegisteredSource {
                    policy: self.policy(entry),
                    entry: entry.clone(),
                })
                .filter(|s| s.policy.enabled)
                .collect()),
        }
    }

    /// Reloads overrides from the store if the cache has expired.
    ///
    /// Returns `true` when a reload happened.
    pub async fn refresh<P: PolicyStore>(
        &mut self,
        store: &P,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if !self.cache.is_stale(now) {
            return Ok(false);
        }
        let overrides = store.load_overrides().await?;
        tracing::debug!(count = overrides.len(), "Loaded source policy overrides");
        self.cache.replace(overrides, now);
        Ok(true)
    }

    /// Forces a reload on the next [`refresh`](Self::refresh).
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}
