//! Runtime-configurable parameters for a rally locality.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `RALLY_`) or by constructing a custom `RallyConfig`.

use std::time::Duration;

/// Component type name of the communicator server factory.
pub const COMMUNICATOR_COMPONENT: &str = "communicator";

/// Tuning parameters for the naming layer, remote dispatch and shutdown.
#[derive(Debug, Clone)]
pub struct RallyConfig {
    /// Timeout applied to every remote action. `None` waits indefinitely;
    /// a rendezvous has no timeout of its own.
    pub rpc_timeout: Option<Duration>,

    /// How long a hosting site waits for a communicator name to be
    /// registered before rejecting a request addressed to it.
    pub resolve_timeout: Duration,

    /// Budget for draining in-flight requests before they are aborted.
    pub shutdown_timeout: Duration,

    /// Branching factor used by hierarchical communicators when none is given.
    pub default_arity: u32,

    /// Number of completed generations a communicator remembers so stale
    /// arrivals can be rejected.
    pub retired_generations: usize,

    /// Component types whose factories are installed at locality start.
    pub components: Vec<String>,
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: None,
            resolve_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            default_arity: 2,
            retired_generations: 1024,
            components: vec![COMMUNICATOR_COMPONENT.to_owned()],
        }
    }
}

impl RallyConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `RALLY_RPC_TIMEOUT_SECS`
    /// - `RALLY_RESOLVE_TIMEOUT_SECS`
    /// - `RALLY_SHUTDOWN_TIMEOUT_SECS`
    /// - `RALLY_DEFAULT_ARITY`
    /// - `RALLY_RETIRED_GENERATIONS`
    /// - `RALLY_COMPONENTS` (comma-separated)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("RALLY_RPC_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.rpc_timeout = Some(Duration::from_secs(s));
            }
        }
        if let Some(v) = lookup("RALLY_RESOLVE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.resolve_timeout = Duration::from_secs(s);
            }
        }
        if let Some(v) = lookup("RALLY_SHUTDOWN_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.shutdown_timeout = Duration::from_secs(s);
            }
        }
        if let Some(v) = lookup("RALLY_DEFAULT_ARITY") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.default_arity = n;
            }
        }
        if let Some(v) = lookup("RALLY_RETIRED_GENERATIONS") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.retired_generations = n;
            }
        }
        if let Some(v) = lookup("RALLY_COMPONENTS") {
            cfg.components = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }

        cfg
    }
}
