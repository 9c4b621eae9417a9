pub mod error;
pub mod generation;
pub mod model;
pub mod service;

pub use error::{Error, ErrorKind, InferenceError, LoadError, ModelLoadError, Result};
pub use generation::{GenerationRequest, GenerationResult};
pub use model::{
    ModelHandle, ModelInfo, ModelRegistry, ModelRuntime, ModelSettings, SamplingParams,
    TextTokenizer, TokenGenerator, TokenId,
};
pub use service::InferenceService;
