use crate::core::error::{Error, Result};
use crate::core::generation::{GenerationRequest, GenerationResult, DEFAULT_MODEL};
use crate::core::model::{ModelInfo, ModelRegistry, ModelRuntime, SamplingParams};
use std::sync::Arc;

/// What both dispatchers call into: resolve the model through the registry,
/// then run generation on the blocking pool.
pub struct InferenceService {
    registry: ModelRegistry,
    default_model: String,
}

impl InferenceService {
    pub fn new(runtime: Arc<dyn ModelRuntime>) -> Self {
        Self {
            registry: ModelRegistry::new(runtime),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_default_model(mut self, name: impl Into<String>) -> Self {
        self.default_model = name.into();
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub async fn generate(&self, req: GenerationRequest) -> Result<GenerationResult> {
        self.generate_holding(req, ()).await
    }

    /// Runs a generation while keeping `guard` alive until the blocking work
    /// is done, even if the caller stops waiting first.
    pub async fn generate_holding<G>(&self, req: GenerationRequest, guard: G) -> Result<GenerationResult>
    where
        G: Send + 'static,
    {
        req.validate().map_err(Error::InvalidRequest)?;

        let model = match req.model_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.default_model.as_str(),
        };

        let (handle, guard) = self.registry.get_or_load_holding(model, guard).await?;
        let runtime = Arc::clone(self.registry.runtime());
        let params = SamplingParams {
            max_length: req.max_length,
            temperature: req.temperature,
        };
        let prompt = req.prompt;

        let text = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            runtime.generate(&handle, &prompt, &params)
        })
        .await??;

        Ok(GenerationResult::from_text(text))
    }

    pub async fn model_info(&self, name: &str) -> Result<ModelInfo> {
        self.model_info_holding(name, ()).await
    }

    pub async fn model_info_holding<G>(&self, name: &str, guard: G) -> Result<ModelInfo>
    where
        G: Send + 'static,
    {
        if name.is_empty() {
            return Err(Error::InvalidRequest("model_name must not be empty".to_string()));
        }
        let (handle, _guard) = self.registry.get_or_load_holding(name, guard).await?;
        Ok(handle.info())
    }
}
