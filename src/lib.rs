pub mod app;
pub mod core;
pub mod infra;

pub use crate::core::{
    Error, ErrorKind, GenerationRequest, GenerationResult, InferenceError, InferenceService,
    LoadError, ModelHandle, ModelInfo, ModelLoadError, ModelRegistry, ModelRuntime,
    ModelSettings, SamplingParams, TextTokenizer, TokenGenerator, TokenId,
};

pub use infra::{Backend, CandleRuntime, ModelLayout};

pub use app::{Dispatcher, Gateway, GatewayConfig, StatusMapping};
