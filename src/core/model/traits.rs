use super::{ModelHandle, TokenId};
use crate::core::error::{InferenceError, LoadError};

/// Text <-> token conversion provided by a model runtime.
pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<TokenId>>;

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> anyhow::Result<String>;
}

/// Autoregressive sampling over a loaded set of weights.
///
/// `generate` returns the full sequence (prompt followed by the sampled
/// tokens), never longer than `params.max_length` unless the prompt itself
/// already is.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self, prompt: &[TokenId], params: &SamplingParams) -> anyhow::Result<Vec<TokenId>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_length: usize,
    pub temperature: f64,
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.max_length == 0 {
            return Err(InferenceError::InvalidParameters(
                "max_length must be positive".to_string(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(InferenceError::InvalidParameters(format!(
                "temperature must be a positive number when sampling, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// A model-runtime backend. The backend (device, weight format) is fixed
/// when the runtime is constructed; nothing here depends on the request.
pub trait ModelRuntime: Send + Sync {
    /// Loads `<models-root>/<name>` into memory.
    fn load_model(&self, name: &str) -> Result<ModelHandle, LoadError>;

    fn generate(
        &self,
        handle: &ModelHandle,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String, InferenceError> {
        params.validate()?;

        let params = SamplingParams {
            max_length: params.max_length.min(handle.context_length()),
            ..*params
        };

        let input = handle.tokenizer().encode(prompt)?;
        let output = handle.generator().generate(&input, &params)?;
        Ok(handle.tokenizer().decode(&output, true)?)
    }
}
