use serde::{Deserialize, Serialize};

/// Tunables for the transition engine.
///
/// ```rust
/// use harel::engine::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(config, EngineConfig::default());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Upper bound on microsteps in one macrostep. Exceeding it means an
    /// eventless or raised-event cycle never settles.
    pub max_microsteps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_microsteps: 1000,
        }
    }
}

impl EngineConfig {
    pub fn with_max_microsteps(mut self, max_microsteps: usize) -> Self {
        self.max_microsteps = max_microsteps;
        self
    }
}
