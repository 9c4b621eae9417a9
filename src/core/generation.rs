use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "deepseek-7b";
pub const DEFAULT_MAX_LENGTH: usize = 128;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// `None` (or empty) selects the configured default model.
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model_name: None,
            max_length: DEFAULT_MAX_LENGTH,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if self.max_length == 0 {
            return Err("max_length must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generated_text: String,
    /// Whitespace-separated word count of `generated_text`, not the number
    /// of tokenizer tokens.
    pub tokens_generated: usize,
}

impl GenerationResult {
    pub fn from_text(generated_text: String) -> Self {
        let tokens_generated = word_count(&generated_text);
        Self {
            generated_text,
            tokens_generated,
        }
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("The quick fox"), 3);
        assert_eq!(word_count("  spaced\tout\n\nwords  "), 3);
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_result_counts_words() {
        let result = GenerationResult::from_text("Hello world".to_string());
        assert_eq!(result.tokens_generated, 2);
    }

    #[test]
    fn test_request_defaults() {
        let req: GenerationRequest = serde_json::from_str(r#"{"prompt": "Hello"}"#).unwrap();
        assert_eq!(req, GenerationRequest::new("Hello"));
        assert_eq!(req.model_name, None);
        assert_eq!(req.max_length, 128);
        assert_eq!(req.temperature, 0.7);
    }

    #[test]
    fn test_request_validation() {
        assert!(GenerationRequest::new("hi").validate().is_ok());
        assert!(GenerationRequest::new("").validate().is_err());
        assert!(GenerationRequest::new("hi").max_length(0).validate().is_err());
        assert!(serde_json::from_str::<GenerationRequest>(r#"{"model_name": "m"}"#).is_err());
    }
}
