// ============================================================================
// Configuration
// ============================================================================

/// Environment variable overriding the state cache capacity. `0` means
/// unbounded.
pub const STATE_CACHE_CAPACITY_ENV: &str = "STATE_CACHE_CAPACITY";

/// Capacity used by `StateCacheConfig::bounded_default`
pub const DEFAULT_BOUNDED_CAPACITY: usize = 10_000;

/// Sizing of the state manager's per-aggregate cache.
///
/// The default keeps every state for the life of the process. A bounded cache
/// evicts states; pair it with `StateManager::rehydrating_from` so evicted
/// aggregates are rebuilt from the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateCacheConfig {
    /// Maximum cached aggregate states; `None` keeps every state
    pub capacity: Option<usize>,
}

impl StateCacheConfig {
    /// Evict least recently used states past `capacity` entries
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
        }
    }

    /// Never evict; process-lifetime cache
    pub fn unbounded() -> Self {
        Self { capacity: None }
    }

    pub fn bounded_default() -> Self {
        Self::bounded(DEFAULT_BOUNDED_CAPACITY)
    }

    /// Read `STATE_CACHE_CAPACITY`, falling back to the default when it is
    /// absent or not a number
    pub fn from_env() -> Self {
        match std::env::var(STATE_CACHE_CAPACITY_ENV) {
            Ok(raw) => Self::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    value = %raw,
                    "Ignoring invalid {}", STATE_CACHE_CAPACITY_ENV
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<usize>().ok()? {
            0 => Some(Self::unbounded()),
            n => Some(Self::bounded(n)),
        }
    }
}
