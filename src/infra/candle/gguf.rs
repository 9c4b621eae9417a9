use crate::core::error::LoadError;
use crate::core::model::{SamplingParams, TokenGenerator, TokenId};
use crate::infra::layout::find_with_extension;
use anyhow::Context;
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::{quantized_llama, quantized_qwen2};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const WEIGHTS_EXTENSION: &str = "gguf";

enum Weights {
    Llama(quantized_llama::ModelWeights),
    Qwen2(quantized_qwen2::ModelWeights),
}

impl Weights {
    fn forward(&mut self, input: &Tensor, start_pos: usize) -> candle_core::Result<Tensor> {
        match self {
            Weights::Llama(m) => m.forward(input, start_pos),
            Weights::Qwen2(m) => m.forward(input, start_pos),
        }
    }
}

/// Quantized weights read from a GGUF file, plus what the file says about
/// itself.
pub struct GgufModel {
    weights: Weights,
    pub path: PathBuf,
    pub architecture: Option<String>,
    pub context_length: Option<usize>,
    pub eos_token: Option<TokenId>,
}

impl GgufModel {
    pub fn load(name: &str, dir: &Path, device: &Device) -> Result<Self, LoadError> {
        let weights_err = |source: anyhow::Error| LoadError::Weights {
            name: name.to_string(),
            source,
        };

        let path = find_with_extension(dir, WEIGHTS_EXTENSION)
            .with_context(|| format!("reading {}", dir.display()))
            .map_err(weights_err)?
            .ok_or_else(|| LoadError::Unsupported {
                name: name.to_string(),
                reason: format!("no .{} weight file in {}", WEIGHTS_EXTENSION, dir.display()),
            })?;

        let file = File::open(&path)
            .with_context(|| format!("opening {}", path.display()))
            .map_err(weights_err)?;
        let mut reader = BufReader::new(file);
        let content = gguf_file::Content::read(&mut reader)
            .with_context(|| format!("parsing {}", path.display()))
            .map_err(weights_err)?;

        let architecture = metadata_string(&content, "general.architecture");
        let context_length = architecture
            .as_deref()
            .and_then(|arch| metadata_usize(&content, &format!("{}.context_length", arch)));
        let eos_token = metadata_usize(&content, "tokenizer.ggml.eos_token_id").map(|id| id as TokenId);

        let weights = match architecture.as_deref().unwrap_or("llama") {
            "llama" => quantized_llama::ModelWeights::from_gguf(content, &mut reader, device)
                .map(Weights::Llama),
            "qwen2" => quantized_qwen2::ModelWeights::from_gguf(content, &mut reader, device)
                .map(Weights::Qwen2),
            other => {
                return Err(LoadError::Unsupported {
                    name: name.to_string(),
                    reason: format!("architecture {} is not supported", other),
                })
            }
        }
        .map_err(|e| weights_err(e.into()))?;

        Ok(Self {
            weights,
            path,
            architecture,
            context_length,
            eos_token,
        })
    }

    pub fn into_generator(self, device: Device, eos_token: Option<TokenId>, seed: Option<u64>) -> GgufGenerator {
        GgufGenerator {
            weights: Mutex::new(self.weights),
            device,
            eos_token: self.eos_token.or(eos_token),
            seed,
        }
    }
}

fn metadata_string(content: &gguf_file::Content, key: &str) -> Option<String> {
    content
        .metadata
        .get(key)
        .and_then(|v| v.to_string().ok())
        .cloned()
}

fn metadata_usize(content: &gguf_file::Content, key: &str) -> Option<usize> {
    let value = content.metadata.get(key)?;
    value
        .to_u32()
        .map(|v| v as usize)
        .or_else(|_| value.to_u64().map(|v| v as usize))
        .ok()
}

/// Sampling loop over one set of quantized weights. The weights hold their
/// own KV cache, so calls on the same model run one at a time.
pub struct GgufGenerator {
    weights: Mutex<Weights>,
    device: Device,
    eos_token: Option<TokenId>,
    seed: Option<u64>,
}

impl TokenGenerator for GgufGenerator {
    fn generate(&self, prompt: &[TokenId], params: &SamplingParams) -> anyhow::Result<Vec<TokenId>> {
        anyhow::ensure!(!prompt.is_empty(), "prompt encoded to zero tokens");

        let mut tokens = prompt.to_vec();
        let budget = params.max_length.saturating_sub(tokens.len());
        let seed = self.seed.unwrap_or_else(rand::random);
        let mut sampler = LogitsProcessor::from_sampling(
            seed,
            Sampling::All {
                temperature: params.temperature,
            },
        );

        let mut weights = self.weights.lock();
        for index in 0..budget {
            // Position 0 resets the KV cache; afterwards only the newest token is fed.
            let start_pos = if index == 0 { 0 } else { tokens.len() - 1 };
            let input = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = weights
                .forward(&input, start_pos)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;

            let next = sampler.sample(&logits)?;
            tokens.push(next);

            if Some(next) == self.eos_token {
                break;
            }
        }

        Ok(tokens)
    }
}
