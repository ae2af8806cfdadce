//! Execution configuration
//!
//! Options can be built in code with the `with_*` builders or read from a
//! YAML/JSON file. Runtime-only handles (custom functions, log sink, cancel
//! token, deadline) are never serialized.

use crate::cancel::CancelToken;
use crate::changes::ChangeFilter;
use crate::functions::RuleFunction;
use crate::ignore::IgnoredItems;
use crate::logging::Logger;
use crate::resolver::ResolverOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rule '{rule_id}': {message}")]
    Rule { rule_id: String, message: String },

    #[error("unknown extends target '{0}'")]
    UnknownExtends(String),

    #[error("extends cycle detected: {0}")]
    ExtendsCycle(String),

    #[error("unable to load remote rule set '{url}': {message}")]
    Remote { url: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn rule(rule_id: &str, message: impl Into<String>) -> Self {
        ConfigError::Rule {
            rule_id: rule_id.to_string(),
            message: message.into(),
        }
    }
}

/// TLS and timeout settings for remote rule sets and references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Client certificate (PEM)
    pub cert_file: Option<PathBuf>,

    /// Client key (PEM)
    pub key_file: Option<PathBuf>,

    /// Extra root certificate (PEM)
    pub ca_file: Option<PathBuf>,

    /// Skip certificate verification and allow plain HTTP
    pub insecure: bool,

    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            cert_file: None,
            key_file: None,
            ca_file: None,
            insecure: false,
            timeout_secs: 30,
        }
    }
}

/// Network policy for `fetch` inside script functions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Permit `http://` URLs
    pub allow_insecure: bool,

    /// Permit loopback, private and link-local addresses
    pub allow_private_networks: bool,

    /// When non-empty, only these hosts (exact or `*.suffix`)
    pub allowed_hosts: Vec<String>,

    /// Hosts always rejected (exact or `*.suffix`)
    pub blocked_hosts: Vec<String>,

    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,

    /// Body size limit in bytes, 0 = unlimited
    pub max_response_size: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allow_insecure: false,
            allow_private_networks: false,
            allowed_hosts: Vec::new(),
            blocked_hosts: Vec::new(),
            timeout: Duration::from_secs(30),
            max_response_size: 10 * 1024 * 1024,
        }
    }
}

/// Everything an execution needs besides the rule set and the document
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// File name used in origins and spec info
    pub spec_file_name: String,

    /// Base path for relative references
    pub base: Option<PathBuf>,

    /// Permit remote `$ref` targets
    pub allow_remote: bool,

    /// Lint documents that are not recognizable OpenAPI/Swagger
    pub skip_document_check: bool,

    /// Materialize the cross-file reference graph
    pub build_deep_graph: bool,

    /// Per-invocation function timeout
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,

    pub ignore_circular_array_ref: bool,
    pub ignore_circular_polymorphic_ref: bool,
    pub extract_references_from_extensions: bool,

    pub http_client_config: HttpClientConfig,
    pub fetch_config: FetchConfig,

    pub silence_logs: bool,

    /// Number of parallel workers (0 = auto-detect)
    pub jobs: usize,

    /// Collect per-rule timing
    pub rule_timings: bool,

    #[serde(skip)]
    pub custom_functions: HashMap<String, Arc<dyn RuleFunction>>,

    #[serde(skip)]
    pub logger: Option<Arc<dyn log::Log>>,

    /// Deadline for the whole execution
    #[serde(skip)]
    pub deadline: Option<Instant>,

    #[serde(skip)]
    pub cancel: Option<CancelToken>,

    #[serde(skip)]
    pub ignore: Option<IgnoredItems>,

    #[serde(skip)]
    pub change_filter: Option<ChangeFilter>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            spec_file_name: String::new(),
            base: None,
            allow_remote: false,
            skip_document_check: false,
            build_deep_graph: false,
            timeout: Duration::from_secs(5),
            ignore_circular_array_ref: false,
            ignore_circular_polymorphic_ref: false,
            extract_references_from_extensions: false,
            http_client_config: HttpClientConfig::default(),
            fetch_config: FetchConfig::default(),
            silence_logs: false,
            jobs: 0,
            rule_timings: false,
            custom_functions: HashMap::new(),
            logger: None,
            deadline: None,
            cancel: None,
            ignore: None,
            change_filter: None,
        }
    }
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut functions: Vec<&String> = self.custom_functions.keys().collect();
        functions.sort();
        f.debug_struct("ExecutionOptions")
            .field("spec_file_name", &self.spec_file_name)
            .field("base", &self.base)
            .field("allow_remote", &self.allow_remote)
            .field("skip_document_check", &self.skip_document_check)
            .field("timeout", &self.timeout)
            .field("jobs", &self.jobs)
            .field("custom_functions", &functions)
            .field("has_logger", &self.logger.is_some())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl ExecutionOptions {
    pub fn new(spec_file_name: &str) -> Self {
        Self {
            spec_file_name: spec_file_name.to_string(),
            ..Self::default()
        }
    }

    /// Load options from a YAML or JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::Invalid(format!(
                "Unknown config file format: {}",
                ext
            ))),
        }
    }

    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Register a custom function under its own name
    pub fn with_function(mut self, function: Arc<dyn RuleFunction>) -> Self {
        self.custom_functions
            .insert(function.name().to_string(), function);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn log::Log>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = config;
        self
    }

    pub fn with_http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.http_client_config = config;
        self
    }

    /// Stop dispatching rules once `limit` has elapsed from now
    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(Instant::now() + limit);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoredItems) -> Self {
        self.ignore = Some(ignore);
        self
    }

    pub fn with_change_filter(mut self, filter: ChangeFilter) -> Self {
        self.change_filter = Some(filter);
        self
    }

    pub fn allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    pub fn skip_document_check(mut self, skip: bool) -> Self {
        self.skip_document_check = skip;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silence_logs = true;
        self
    }

    /// Worker count with 0 mapped to the number of CPUs
    pub fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            num_cpus::get()
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            ignore_array: self.ignore_circular_array_ref,
            ignore_polymorphic: self.ignore_circular_polymorphic_ref,
            include_extensions: self.extract_references_from_extensions,
            build_graph: self.build_deep_graph,
        }
    }

    pub fn make_logger(&self) -> Logger {
        Logger::new(self.logger.clone(), self.silence_logs)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
