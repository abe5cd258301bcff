//! Job type configuration and registry.
//!
//! Each job type is declared once, either in code through the [`JobConfig`]
//! builder or in a TOML definitions file, and frozen into a [`JobRegistry`]
//! before any worker uses it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::keys;

/// Callback fired on a contention outcome. Receives the job type and args.
/// Must not panic; it runs inline on the worker.
pub type Hook = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

/// Derives the identifier from a job's arguments.
pub type IdentifierFn = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

/// Optional contention callbacks. Unset hooks do nothing.
#[derive(Clone, Default)]
pub struct Hooks {
    pub lock_failed: Option<Hook>,
    pub admission_failed: Option<Hook>,
    pub lock_expired: Option<Hook>,
}

impl Hooks {
    pub(crate) fn fire(hook: &Option<Hook>, job_type: &str, args: &[Value]) {
        if let Some(hook) = hook {
            hook(job_type, args);
        }
    }
}

/// Locking configuration for one job type.
#[derive(Clone)]
pub struct JobConfig {
    pub(crate) job_type: String,
    pub(crate) timeout_seconds: u64,
    pub(crate) singleton: bool,
    pub(crate) identifier: Option<IdentifierFn>,
    pub(crate) hooks: Hooks,
}

impl JobConfig {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            timeout_seconds: 0,
            singleton: false,
            identifier: None,
            hooks: Hooks::default(),
        }
    }

    /// Lease length. 0 (the default) means the lock never expires.
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Allow at most one queued-or-running instance per identifier.
    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    /// Replace the default identifier derivation.
    pub fn identifier<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> String + Send + Sync + 'static,
    {
        self.identifier = Some(Arc::new(f));
        self
    }

    pub fn on_lock_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[Value]) + Send + Sync + 'static,
    {
        self.hooks.lock_failed = Some(Arc::new(f));
        self
    }

    pub fn on_admission_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[Value]) + Send + Sync + 'static,
    {
        self.hooks.admission_failed = Some(Arc::new(f));
        self
    }

    pub fn on_lock_expired<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[Value]) + Send + Sync + 'static,
    {
        self.hooks.lock_expired = Some(Arc::new(f));
        self
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn timeout(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Identifier for these args, via the override if one is set.
    pub fn identifier_for(&self, args: &[Value]) -> String {
        match &self.identifier {
            Some(f) => f(args),
            None => keys::identifier(args),
        }
    }

    pub fn lock_key(&self, args: &[Value]) -> String {
        keys::lock_key(&self.job_type, &self.identifier_for(args))
    }

    pub fn admission_key(&self, args: &[Value]) -> String {
        keys::admission_key(&self.job_type, &self.identifier_for(args))
    }
}

impl std::fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConfig")
            .field("job_type", &self.job_type)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("singleton", &self.singleton)
            .field("custom_identifier", &self.identifier.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TOML definitions
// ---------------------------------------------------------------------------

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct Definitions {
    #[serde(default)]
    job: Vec<JobDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobDefinition {
    name: String,
    #[serde(default)]
    timeout: i64,
    #[serde(default)]
    singleton: bool,
}

impl TryFrom<JobDefinition> for JobConfig {
    type Error = Error;

    fn try_from(def: JobDefinition) -> Result<Self> {
        if def.name.trim().is_empty() {
            return Err(Error::Config("job definition has an empty name".to_string()));
        }
        let timeout = u64::try_from(def.timeout).map_err(|_| {
            Error::Config(format!(
                "job {} has negative timeout {}",
                def.name, def.timeout
            ))
        })?;
        Ok(JobConfig::new(def.name)
            .timeout_seconds(timeout)
            .singleton(def.singleton))
    }
}

/// Parse `[[job]]` tables into configs, rejecting bad values.
pub fn parse_definitions(content: &str) -> Result<Vec<JobConfig>> {
    let defs: Definitions =
        toml::from_str(content).map_err(|e| Error::Config(format!("bad job definitions: {e}")))?;
    defs.job.into_iter().map(JobConfig::try_from).collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Job type configurations, indexed by job type.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<JobConfig>>,
}

impl JobRegistry {
    /// Create an empty registry with no job types.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a job type. Each job type may be declared only once.
    pub fn register(&mut self, config: JobConfig) -> Result<()> {
        if self.jobs.contains_key(&config.job_type) {
            return Err(Error::Config(format!(
                "job type {} declared twice",
                config.job_type
            )));
        }
        if i64::try_from(config.timeout_seconds).is_err() {
            return Err(Error::Config(format!(
                "job type {} timeout {}s does not fit a timestamp",
                config.job_type, config.timeout_seconds
            )));
        }
        self.jobs
            .insert(config.job_type.clone(), Arc::new(config));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, config: JobConfig) -> Result<Self> {
        self.register(config)?;
        Ok(self)
    }

    /// Build a registry from TOML job definitions.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut registry = Self::empty();
        for config in parse_definitions(content)? {
            registry.register(config)?;
        }
        Ok(registry)
    }

    /// Load a TOML job definitions file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read job definitions {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Look up a job type.
    pub fn get(&self, job_type: &str) -> Result<&Arc<JobConfig>> {
        self.jobs
            .get(job_type)
            .ok_or_else(|| Error::UnknownJobType(job_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_override_drives_keys() {
        let config = JobConfig::new("Export").identifier(|args| {
            args.first().map(|v| v.to_string()).unwrap_or_default()
        });
        let args = [json!(42), json!("ignored")];
        assert_eq!(config.lock_key(&args), "lock:Export:42");
        assert_eq!(config.admission_key(&args), "admission:lock:Export:42");
    }

    #[test]
    fn default_config_has_no_timeout_and_is_not_singleton() {
        let config = JobConfig::new("Export");
        assert_eq!(config.timeout(), 0);
        assert!(!config.is_singleton());
        assert_eq!(config.lock_key(&[json!(1), json!(2)]), "lock:Export:1-2");
    }
}
