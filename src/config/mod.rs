//! Configuration models for the scheduling core.

use serde::{Deserialize, Serialize};

/// Shared worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkPoolConfig {
    /// Number of pool worker threads.
    pub worker_count: usize,
    /// Injector queue capacity; submissions beyond it are rejected.
    pub max_queue_depth: usize,
    /// Stack size for pool and dedicated threads, in bytes.
    pub thread_stack_size: usize,
}

impl Default for WorkPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            max_queue_depth: 256,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl WorkPoolConfig {
    /// Defaults sized from the host CPU count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the injector queue capacity.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Set the worker thread stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// A human-readable description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Merge tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Rounds of cheap signal-flag checks before a merged stream falls back
    /// to a true blocking wait. Zero disables spinning entirely.
    pub spin_limit: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { spin_limit: 64 }
    }
}

impl MergeConfig {
    /// Default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of spin rounds before blocking.
    #[must_use]
    pub const fn with_spin_limit(mut self, spin_limit: u32) -> Self {
        self.spin_limit = spin_limit;
        self
    }
}

/// Root configuration for the scheduling core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Worker pool settings.
    pub pool: WorkPoolConfig,
    /// Merge settings.
    pub merge: MergeConfig,
}

impl CoreConfig {
    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// A description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        self.pool
            .validate()
            .map_err(|e| format!("pool config invalid: {e}"))
    }

    /// Parse and validate configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// A parse or validation failure description.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the environment, loading a `.env` file when
    /// present. Recognized variables: `PMS_WORKER_COUNT`,
    /// `PMS_MAX_QUEUE_DEPTH`, `PMS_SPIN_LIMIT`. Unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// A description of the first unparsable or invalid variable.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(value) = read_env("PMS_WORKER_COUNT")? {
            config.pool.worker_count = value;
        }
        if let Some(value) = read_env("PMS_MAX_QUEUE_DEPTH")? {
            config.pool.max_queue_depth = value;
        }
        if let Some(value) = read_env("PMS_SPIN_LIMIT")? {
            config.merge.spin_limit = value;
        }
        config.validate()?;
        Ok(config)
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("{name} is not a valid value: {raw}")),
        Err(_) => Ok(None),
    }
}
