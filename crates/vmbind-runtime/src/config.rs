//! Runtime configuration for binding compilation and dispatch.
//!
//! Values come from [`BindingConfig::default`], explicit `with_*` builders,
//! or the process environment:
//!
//! | Variable                        | Field                      | Default |
//! |---------------------------------|----------------------------|---------|
//! | `VMBIND_TRACK_CHANGES`          | `track_changes`            | on      |
//! | `VMBIND_WARN_DROPPED_BINDINGS`  | `warn_on_dropped_bindings` | off     |
//!
//! Flags accept `1`, `true`, `yes` or `on` (case-insensitive); any other
//! value turns the flag off.

pub const ENV_TRACK_CHANGES: &str = "VMBIND_TRACK_CHANGES";
pub const ENV_WARN_DROPPED_BINDINGS: &str = "VMBIND_WARN_DROPPED_BINDINGS";

#[inline]
fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Knobs shared by every view registered with one
/// [`ViewRegistry`](crate::ViewRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingConfig {
    /// Run handlers inside [`ChangeTracker`](crate::ChangeTracker) scopes.
    pub track_changes: bool,
    /// Log dropped binding declarations at warn level instead of debug.
    pub warn_on_dropped_bindings: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            track_changes: true,
            warn_on_dropped_bindings: false,
        }
    }
}

impl BindingConfig {
    #[must_use]
    pub fn with_track_changes(mut self, enabled: bool) -> Self {
        self.track_changes = enabled;
        self
    }

    #[must_use]
    pub fn with_warn_on_dropped_bindings(mut self, enabled: bool) -> Self {
        self.warn_on_dropped_bindings = enabled;
        self
    }

    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read the configuration through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = get_env(ENV_TRACK_CHANGES) {
            config.track_changes = env_flag(&value);
        }
        if let Some(value) = get_env(ENV_WARN_DROPPED_BINDINGS) {
            config.warn_on_dropped_bindings = env_flag(&value);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        assert_eq!(
            BindingConfig::from_env_with(lookup(&[])),
            BindingConfig::default()
        );
    }

    #[test]
    fn env_flags_parse_truthy_values() {
        for truthy in ["1", "true", "YES", " on "] {
            let config = BindingConfig::from_env_with(lookup(&[(ENV_WARN_DROPPED_BINDINGS, truthy)]));
            assert!(config.warn_on_dropped_bindings, "{truthy:?} should enable");
        }
    }

    #[test]
    fn unrecognized_value_disables_flag() {
        let config = BindingConfig::from_env_with(lookup(&[(ENV_TRACK_CHANGES, "maybe")]));
        assert!(!config.track_changes);
    }

    #[test]
    fn builders_override_fields() {
        let config = BindingConfig::default()
            .with_track_changes(false)
            .with_warn_on_dropped_bindings(true);
        assert!(!config.track_changes);
        assert!(config.warn_on_dropped_bindings);
    }
}
