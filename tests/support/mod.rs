#![allow(dead_code)]

use llm_gateway::app::{Dispatcher, GatewayConfig};
use llm_gateway::{
    InferenceService, LoadError, ModelHandle, ModelLayout, ModelRuntime, SamplingParams,
    TextTokenizer, TokenGenerator, TokenId,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const EOS: TokenId = 256;

/// One token per byte; ids above 255 are special.
pub struct ByteTokenizer;

impl TextTokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<TokenId>> {
        Ok(text.bytes().map(TokenId::from).collect())
    }

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> anyhow::Result<String> {
        let mut bytes = Vec::with_capacity(tokens.len());
        for &t in tokens {
            match u8::try_from(t) {
                Ok(b) => bytes.push(b),
                Err(_) if skip_special_tokens => {}
                Err(_) => bytes.extend_from_slice(b"</s>"),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Appends a fixed continuation to the prompt, then EOS, within `max_length`.
pub struct ContinuationGenerator {
    continuation: Vec<u8>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl TokenGenerator for ContinuationGenerator {
    fn generate(&self, prompt: &[TokenId], params: &SamplingParams) -> anyhow::Result<Vec<TokenId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);

        let mut tokens = prompt.to_vec();
        for &b in &self.continuation {
            if tokens.len() >= params.max_length {
                return Ok(tokens);
            }
            tokens.push(TokenId::from(b));
        }
        if tokens.len() < params.max_length {
            tokens.push(EOS);
        }
        Ok(tokens)
    }
}

pub struct ScriptedRuntime {
    layout: ModelLayout,
    continuation: String,
    load_delay: Duration,
    generate_delay: Duration,
    loads: AtomicUsize,
    generations: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedRuntime {
    pub fn new(root: &Path, continuation: &str) -> Self {
        Self {
            layout: ModelLayout::new(root),
            continuation: continuation.to_string(),
            load_delay: Duration::ZERO,
            generate_delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
            generations: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    /// Most generations ever running at the same time.
    pub fn peak_generations(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ModelRuntime for ScriptedRuntime {
    fn load_model(&self, name: &str) -> Result<ModelHandle, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);

        let dir = self.layout.resolve(name)?;
        let generator = ContinuationGenerator {
            continuation: self.continuation.as_bytes().to_vec(),
            delay: self.generate_delay,
            calls: Arc::clone(&self.generations),
            running: Arc::clone(&self.running),
            peak: Arc::clone(&self.peak),
        };
        Ok(ModelHandle::new(name, dir, Box::new(ByteTokenizer), Box::new(generator)))
    }
}

/// Temporary models root containing one empty directory per name.
pub fn models_root(models: &[&str]) -> tempfile::TempDir {
    let root = tempfile::tempdir().expect("tempdir");
    for m in models {
        std::fs::create_dir(root.path().join(m)).expect("model dir");
    }
    root
}

pub fn service(runtime: Arc<ScriptedRuntime>) -> Arc<InferenceService> {
    Arc::new(InferenceService::new(runtime))
}

pub fn dispatcher(service: Arc<InferenceService>, config: &GatewayConfig) -> Dispatcher {
    Dispatcher::new(service, config.http_max_concurrency)
        .with_timeout(config.request_timeout())
        .with_status_mapping(config.status_mapping)
}
