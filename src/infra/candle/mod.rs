pub mod gguf;
pub mod tokenizer;

pub use gguf::{GgufGenerator, GgufModel};
pub use tokenizer::HfTokenizer;

use crate::core::error::LoadError;
use crate::core::model::{ModelHandle, ModelRuntime, ModelSettings};
use crate::infra::layout::ModelLayout;
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl Backend {
    pub fn device(self) -> candle_core::Result<Device> {
        match self {
            Backend::Auto => {
                if candle_core::utils::cuda_is_available() {
                    Device::new_cuda(0)
                } else if candle_core::utils::metal_is_available() {
                    Device::new_metal(0)
                } else {
                    Ok(Device::Cpu)
                }
            }
            Backend::Cpu => Ok(Device::Cpu),
            Backend::Cuda => Device::new_cuda(0),
            Backend::Metal => Device::new_metal(0),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "cpu" => Ok(Backend::Cpu),
            "cuda" | "gpu" => Ok(Backend::Cuda),
            "metal" | "mps" => Ok(Backend::Metal),
            other => Err(format!("unknown backend '{}', expected auto, cpu, cuda or metal", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Auto => "auto",
            Backend::Cpu => "cpu",
            Backend::Cuda => "cuda",
            Backend::Metal => "metal",
        };
        f.write_str(name)
    }
}

/// Runtime over candle quantized models: `<root>/<name>/tokenizer.json`
/// plus one GGUF weight file. The device is picked once, here.
pub struct CandleRuntime {
    layout: ModelLayout,
    device: Device,
    defaults: ModelSettings,
    overrides: HashMap<String, ModelSettings>,
    seed: Option<u64>,
}

impl CandleRuntime {
    pub fn new(models_root: impl Into<PathBuf>, backend: Backend) -> anyhow::Result<Self> {
        let device = backend.device()?;
        tracing::info!(backend = %backend, device = ?device, "model runtime ready");

        Ok(Self {
            layout: ModelLayout::new(models_root),
            device,
            defaults: ModelSettings::defaults(),
            overrides: Default::default(),
            seed: None,
        })
    }

    pub fn with_defaults(mut self, defaults: ModelSettings) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, ModelSettings>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

impl ModelRuntime for CandleRuntime {
    fn load_model(&self, name: &str) -> Result<ModelHandle, LoadError> {
        let dir = self.layout.resolve(name)?;
        let tokenizer = HfTokenizer::from_dir(name, &dir)?;
        let model = GgufModel::load(name, &dir, &self.device)?;

        tracing::debug!(model = name, weights = %model.path.display(), "weights read");

        let detected = ModelSettings {
            context_length: model.context_length,
            architecture: model.architecture.clone(),
        };
        let settings = self
            .overrides
            .get(name)
            .cloned()
            .unwrap_or_default()
            .or(detected)
            .or(self.defaults.clone());

        let generator = model.into_generator(self.device.clone(), tokenizer.eos_token(), self.seed);

        Ok(ModelHandle::new(name, dir, Box::new(tokenizer), Box::new(generator))
            .with_settings(&settings))
    }
}
