//! Pool configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::loader::TemplateRef;

fn default_pool_name() -> String {
    "entity_pool".to_string()
}

/// Static configuration for one poolable kind.
///
/// Supplied at pool construction and immutable thereafter. Each kind is identified by its template reference, which
/// must be unique across the configured kind set.
#[derive(Clone, Debug, Deserialize)]
pub struct KindConfig {
    /// Reference to the template used to instantiate entities of this kind.
    pub template: TemplateRef,

    /// Maximum number of instances that are not subject to overflow eviction.
    ///
    /// More instances than this may transiently exist when demand exceeds capacity; instances beyond capacity are
    /// only reclaimed on release, and only if `evict_overflow` is set.
    pub capacity: usize,

    /// Whether to eagerly instantiate `capacity` entities when the pool is initialized.
    #[serde(default)]
    pub preallocate: bool,

    /// Whether instances created beyond capacity are scheduled for destruction when released, instead of being kept
    /// inactive for reuse.
    #[serde(default)]
    pub evict_overflow: bool,

    /// Delay, in seconds, before a scheduled-for-destruction overflow instance is actually destroyed.
    #[serde(default)]
    pub overflow_lifetime_secs: f64,
}

impl KindConfig {
    /// Creates a new `KindConfig` for the given template with the given capacity.
    ///
    /// Preallocation and overflow eviction are disabled by default.
    pub fn new<T: Into<TemplateRef>>(template: T, capacity: usize) -> Self {
        Self {
            template: template.into(),
            capacity,
            preallocate: false,
            evict_overflow: false,
            overflow_lifetime_secs: 0.0,
        }
    }

    /// Sets whether entities are eagerly instantiated when the pool is initialized.
    pub fn with_preallocate(mut self, preallocate: bool) -> Self {
        self.preallocate = preallocate;
        self
    }

    /// Enables overflow eviction, destroying over-capacity instances after the given delay once they are released.
    pub fn with_overflow_eviction(mut self, lifetime: Duration) -> Self {
        self.evict_overflow = true;
        self.overflow_lifetime_secs = lifetime.as_secs_f64();
        self
    }

    /// Returns the delay before an evicted overflow instance is destroyed.
    pub fn overflow_lifetime(&self) -> Duration {
        Duration::from_secs_f64(self.overflow_lifetime_secs)
    }
}

/// Configuration for an entity pool.
#[derive(Clone, Debug, Deserialize)]
pub struct PoolConfig {
    /// Name of the pool.
    ///
    /// Passed to the loader as the parent context for instantiated entities. Defaults to `entity_pool`.
    #[serde(default = "default_pool_name")]
    pub name: String,

    /// Configured kinds, one entry per supported template.
    pub kinds: Vec<KindConfig>,
}

impl PoolConfig {
    /// Creates a new `PoolConfig` with the default pool name and the given kinds.
    pub fn from_kinds(kinds: Vec<KindConfig>) -> Self {
        Self {
            name: default_pool_name(),
            kinds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let config: PoolConfig = serde_json::from_str(
            r#"{
                "kinds": [
                    { "template": "enemies/grunt", "capacity": 8 },
                    { "template": "fx/explosion", "capacity": 2, "evict_overflow": true, "overflow_lifetime_secs": 1.5 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.name, "entity_pool");
        assert_eq!(config.kinds.len(), 2);

        let grunt = &config.kinds[0];
        assert_eq!(grunt.template.as_str(), "enemies/grunt");
        assert_eq!(grunt.capacity, 8);
        assert!(!grunt.preallocate);
        assert!(!grunt.evict_overflow);

        let explosion = &config.kinds[1];
        assert!(explosion.evict_overflow);
        assert_eq!(explosion.overflow_lifetime(), Duration::from_millis(1500));
    }

    #[test]
    fn builder_roundtrip() {
        let kind = KindConfig::new("fx/smoke", 4)
            .with_preallocate(true)
            .with_overflow_eviction(Duration::from_secs(5));

        assert_eq!(kind.template.as_str(), "fx/smoke");
        assert_eq!(kind.capacity, 4);
        assert!(kind.preallocate);
        assert!(kind.evict_overflow);
        assert_eq!(kind.overflow_lifetime(), Duration::from_secs(5));
    }
}
