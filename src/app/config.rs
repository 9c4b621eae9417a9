use crate::core::generation::DEFAULT_MODEL;
use crate::core::model::{ModelSettings, DEFAULT_ARCHITECTURE, DEFAULT_CONTEXT_LENGTH};
use crate::infra::Backend;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_GRPC_ADDR: &str = "0.0.0.0:50051";
pub const DEFAULT_MODELS_ROOT: &str = "/app/models";

/// How failures are reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMapping {
    /// Each error kind gets its own HTTP status / gRPC code.
    #[default]
    Typed,
    /// Every model or inference failure is a 500 / INTERNAL.
    Collapsed,
}

impl FromStr for StatusMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "typed" => Ok(StatusMapping::Typed),
            "collapsed" => Ok(StatusMapping::Collapsed),
            other => Err(format!("unknown status mapping '{}', expected typed or collapsed", other)),
        }
    }
}

impl fmt::Display for StatusMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMapping::Typed => f.write_str("typed"),
            StatusMapping::Collapsed => f.write_str("collapsed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub http_addr: SocketAddr,
    pub grpc_addr: SocketAddr,
    pub models_root: PathBuf,
    pub default_model: String,
    pub backend: Backend,
    pub http_max_concurrency: usize,
    pub grpc_workers: usize,
    /// Seconds a request may wait for its result; 0 waits forever.
    pub request_timeout_secs: u64,
    pub status_mapping: StatusMapping,
    pub seed: Option<u64>,
    pub default_context_length: usize,
    pub default_architecture: String,
    pub models: HashMap<String, ModelSettings>,
    pub preload: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            grpc_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            models_root: PathBuf::from(DEFAULT_MODELS_ROOT),
            default_model: DEFAULT_MODEL.to_string(),
            backend: Backend::Auto,
            http_max_concurrency: 16,
            grpc_workers: 4,
            request_timeout_secs: 300,
            status_mapping: StatusMapping::Typed,
            seed: None,
            default_context_length: DEFAULT_CONTEXT_LENGTH,
            default_architecture: DEFAULT_ARCHITECTURE.to_string(),
            models: HashMap::new(),
            preload: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Defaults, overlaid by the YAML file (if any), overlaid by `LLM_GATEWAY_*`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LLM_GATEWAY_HTTP_ADDR") {
            self.http_addr = parse_var("LLM_GATEWAY_HTTP_ADDR", &v)?;
        }
        if let Some(v) = lookup("LLM_GATEWAY_GRPC_ADDR") {
            self.grpc_addr = parse_var("LLM_GATEWAY_GRPC_ADDR", &v)?;
        }
        if let Some(v) = lookup("LLM_GATEWAY_MODELS") {
            self.models_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("LLM_GATEWAY_DEFAULT_MODEL") {
            self.default_model = v;
        }
        if let Some(v) = lookup("LLM_GATEWAY_BACKEND") {
            self.backend = parse_var("LLM_GATEWAY_BACKEND", &v)?;
        }
        if let Some(v) = lookup("LLM_GATEWAY_HTTP_CONCURRENCY") {
            self.http_max_concurrency = parse_var("LLM_GATEWAY_HTTP_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("LLM_GATEWAY_GRPC_WORKERS") {
            self.grpc_workers = parse_var("LLM_GATEWAY_GRPC_WORKERS", &v)?;
        }
        if let Some(v) = lookup("LLM_GATEWAY_TIMEOUT") {
            self.request_timeout_secs = parse_var("LLM_GATEWAY_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("LLM_GATEWAY_STATUS_MAPPING") {
            self.status_mapping = parse_var("LLM_GATEWAY_STATUS_MAPPING", &v)?;
        }
        if let Some(v) = lookup("LLM_GATEWAY_SEED") {
            self.seed = Some(parse_var("LLM_GATEWAY_SEED", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_model.is_empty() {
            bail!("default_model must not be empty");
        }
        if self.http_max_concurrency == 0 {
            bail!("http_max_concurrency must be at least 1");
        }
        if self.grpc_workers == 0 {
            bail!("grpc_workers must be at least 1");
        }
        if self.default_context_length == 0 {
            bail!("default_context_length must be positive");
        }
        if self.http_addr == self.grpc_addr && self.http_addr.port() != 0 {
            bail!("http_addr and grpc_addr must differ, both are {}", self.http_addr);
        }
        Ok(())
    }

    /// `models_root` with a leading `~` expanded.
    pub fn models_root(&self) -> PathBuf {
        match self.models_root.strip_prefix("~") {
            Ok(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| self.models_root.clone()),
            Err(_) => self.models_root.clone(),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn model_defaults(&self) -> ModelSettings {
        ModelSettings {
            context_length: Some(self.default_context_length),
            architecture: Some(self.default_architecture.clone()),
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", value, key, e))
}
