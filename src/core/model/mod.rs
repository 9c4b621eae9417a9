pub mod registry;
pub mod traits;

pub use registry::ModelRegistry;
pub use traits::{ModelRuntime, SamplingParams, TextTokenizer, TokenGenerator};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub type TokenId = u32;

pub const DEFAULT_CONTEXT_LENGTH: usize = 2048;
pub const DEFAULT_ARCHITECTURE: &str = "Transformer";

/// One loaded model. Built by a [`ModelRuntime`] and, once handed to the
/// registry, only ever shared behind an `Arc` and never mutated.
pub struct ModelHandle {
    name: String,
    path: PathBuf,
    architecture: String,
    context_length: usize,
    tokenizer: Box<dyn TextTokenizer>,
    generator: Box<dyn TokenGenerator>,
}

impl ModelHandle {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        tokenizer: Box<dyn TextTokenizer>,
        generator: Box<dyn TokenGenerator>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            context_length: DEFAULT_CONTEXT_LENGTH,
            tokenizer,
            generator,
        }
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    /// Applies whatever `settings` specifies; unset fields keep their value.
    pub fn with_settings(mut self, settings: &ModelSettings) -> Self {
        if let Some(context_length) = settings.context_length {
            self.context_length = context_length;
        }
        if let Some(architecture) = &settings.architecture {
            self.architecture = architecture.clone();
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    pub fn tokenizer(&self) -> &dyn TextTokenizer {
        self.tokenizer.as_ref()
    }

    pub fn generator(&self) -> &dyn TokenGenerator {
        self.generator.as_ref()
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.name.clone(),
            max_length: self.context_length,
            architecture: self.architecture.clone(),
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("architecture", &self.architecture)
            .field("context_length", &self.context_length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub max_length: usize,
    pub architecture: String,
}

/// Descriptive metadata reported for a model. Every field is optional so
/// sources can be layered: configured override, then what the weights say,
/// then the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub context_length: Option<usize>,
    #[serde(default)]
    pub architecture: Option<String>,
}

impl ModelSettings {
    pub fn defaults() -> Self {
        Self {
            context_length: Some(DEFAULT_CONTEXT_LENGTH),
            architecture: Some(DEFAULT_ARCHITECTURE.to_string()),
        }
    }

    pub fn or(self, fallback: ModelSettings) -> Self {
        Self {
            context_length: self.context_length.or(fallback.context_length),
            architecture: self.architecture.or(fallback.architecture),
        }
    }
}
