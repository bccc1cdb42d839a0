//! Scheduler configuration
//!
//! Defines every tunable of the run queue: resource defaults, timeouts,
//! polling intervals and the addresses of the collaborating services.

use std::str::FromStr;
use std::time::Duration;

use crate::selection::StrategyKind;

/// Scheduler configuration
///
/// All timeouts and intervals are configurable so tests can run the queue
/// with millisecond polling and deployments can tune for slow workers.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// Externally visible base URL used when rendering links (empty for relative links)
    pub public_url: String,

    /// Memory given to an application when neither the request nor the project sets one
    pub default_memory_mb: u64,

    /// Memory ceiling for workspaces that do not configure their own
    pub max_memory_mb: u64,

    /// Application lifetime when the workspace does not override it; zero means unlimited
    pub default_lifetime: Duration,

    /// How long a task may wait for a runner before the reclaimer expires it
    pub max_waiting_time: Duration,

    /// Extra time after a process lifetime before its bookkeeping is dropped
    pub cleanup_grace: Duration,

    /// Period of the reclamation sweep
    pub cleanup_period: Duration,

    /// Delay between runner availability polls while a task waits for capacity
    pub selection_poll_interval: Duration,

    /// Delay between build status polls
    pub build_poll_interval: Duration,

    /// Number of admission lock partitions. More partitions mean fewer
    /// unrelated workspaces contending for the same lock at the cost of one
    /// mutex each.
    pub accounting_partitions: usize,

    /// Tie-break policy among runners with enough capacity
    pub selection_strategy: StrategyKind,

    /// Timeout applied to every call made to a worker node
    pub worker_timeout: Duration,

    pub project_api_url: String,
    pub workspace_api_url: String,
    pub builder_api_url: String,

    /// Worker nodes registered in the shared pool at startup
    pub workers: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_url: String::new(),
            default_memory_mb: 512,
            max_memory_mb: 1024,
            default_lifetime: Duration::from_secs(900),
            max_waiting_time: Duration::from_secs(600),
            cleanup_grace: Duration::from_secs(60),
            cleanup_period: Duration::from_secs(10),
            selection_poll_interval: Duration::from_millis(1000),
            build_poll_interval: Duration::from_millis(1000),
            accounting_partitions: 16,
            selection_strategy: StrategyKind::LastUsed,
            worker_timeout: Duration::from_secs(10),
            project_api_url: "http://localhost:8081/api".to_string(),
            workspace_api_url: "http://localhost:8081/api".to_string(),
            builder_api_url: "http://localhost:8082/api".to_string(),
            workers: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to [`SchedulerConfig::default`]:
    /// - RUNQ_BIND_ADDR, RUNQ_PUBLIC_URL
    /// - RUNQ_DEFAULT_MEMORY_MB, RUNQ_MAX_MEMORY_MB
    /// - RUNQ_DEFAULT_LIFETIME, RUNQ_MAX_WAITING_TIME, RUNQ_CLEANUP_GRACE, RUNQ_CLEANUP_PERIOD (seconds)
    /// - RUNQ_SELECTION_POLL, RUNQ_BUILD_POLL, RUNQ_WORKER_TIMEOUT (milliseconds)
    /// - RUNQ_ACCOUNTING_PARTITIONS, RUNQ_SELECTION_STRATEGY (`last-used` | `round-robin`)
    /// - RUNQ_PROJECT_API_URL, RUNQ_WORKSPACE_API_URL, RUNQ_BUILDER_API_URL
    /// - RUNQ_WORKERS (comma-separated worker base URLs)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let selection_strategy = match std::env::var("RUNQ_SELECTION_STRATEGY") {
            Ok(value) => StrategyKind::from_str(&value).map_err(anyhow::Error::msg)?,
            Err(_) => defaults.selection_strategy,
        };

        let workers = std::env::var("RUNQ_WORKERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr: env_string("RUNQ_BIND_ADDR").unwrap_or(defaults.bind_addr),
            public_url: env_string("RUNQ_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_url),
            default_memory_mb: env_parse("RUNQ_DEFAULT_MEMORY_MB")
                .unwrap_or(defaults.default_memory_mb),
            max_memory_mb: env_parse("RUNQ_MAX_MEMORY_MB").unwrap_or(defaults.max_memory_mb),
            default_lifetime: env_parse("RUNQ_DEFAULT_LIFETIME")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_lifetime),
            max_waiting_time: env_parse("RUNQ_MAX_WAITING_TIME")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_waiting_time),
            cleanup_grace: env_parse("RUNQ_CLEANUP_GRACE")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_grace),
            cleanup_period: env_parse("RUNQ_CLEANUP_PERIOD")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_period),
            selection_poll_interval: env_parse("RUNQ_SELECTION_POLL")
                .map(Duration::from_millis)
                .unwrap_or(defaults.selection_poll_interval),
            build_poll_interval: env_parse("RUNQ_BUILD_POLL")
                .map(Duration::from_millis)
                .unwrap_or(defaults.build_poll_interval),
            accounting_partitions: env_parse("RUNQ_ACCOUNTING_PARTITIONS")
                .unwrap_or(defaults.accounting_partitions),
            selection_strategy,
            worker_timeout: env_parse("RUNQ_WORKER_TIMEOUT")
                .map(Duration::from_millis)
                .unwrap_or(defaults.worker_timeout),
            project_api_url: env_string("RUNQ_PROJECT_API_URL")
                .unwrap_or(defaults.project_api_url),
            workspace_api_url: env_string("RUNQ_WORKSPACE_API_URL")
                .unwrap_or(defaults.workspace_api_url),
            builder_api_url: env_string("RUNQ_BUILDER_API_URL")
                .unwrap_or(defaults.builder_api_url),
            workers,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.default_memory_mb == 0 {
            anyhow::bail!("default_memory_mb must be greater than 0");
        }

        if self.max_memory_mb < self.default_memory_mb {
            anyhow::bail!(
                "max_memory_mb ({}) must not be lower than default_memory_mb ({})",
                self.max_memory_mb,
                self.default_memory_mb
            );
        }

        if self.accounting_partitions == 0 {
            anyhow::bail!("accounting_partitions must be greater than 0");
        }

        if self.cleanup_period.is_zero() {
            anyhow::bail!("cleanup_period must be greater than 0");
        }

        if self.selection_poll_interval.is_zero() || self.build_poll_interval.is_zero() {
            anyhow::bail!("poll intervals must be greater than 0");
        }

        for url in [
            &self.project_api_url,
            &self.workspace_api_url,
            &self.builder_api_url,
        ]
        .into_iter()
        .chain(self.workers.iter())
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("'{}' must start with http:// or https://", url);
            }
        }

        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
