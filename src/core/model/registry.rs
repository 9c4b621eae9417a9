use super::traits::ModelRuntime;
use super::{ModelHandle, ModelInfo};
use crate::core::error::{LoadError, ModelLoadError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<ModelHandle>>>;

/// Loaded models keyed by name.
///
/// Each name owns a slot that is filled at most once. Concurrent first
/// requests for the same name wait on the slot while a single load runs;
/// different names load independently. A failed load leaves the slot empty
/// so the next request tries again.
pub struct ModelRegistry {
    runtime: Arc<dyn ModelRuntime>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ModelRegistry {
    pub fn new(runtime: Arc<dyn ModelRuntime>) -> Self {
        Self {
            runtime,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ModelRuntime> {
        &self.runtime
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelHandle>> {
        self.slots.lock().get(name).and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub async fn get_or_load(&self, name: &str) -> Result<Arc<ModelHandle>, ModelLoadError> {
        self.get_or_load_holding(name, ())
            .await
            .map(|(handle, ())| handle)
    }

    /// Same as [`get_or_load`](Self::get_or_load), but `guard` stays alive
    /// until the load finishes and is handed back with the handle.
    ///
    /// The load runs in its own task. A caller that stops waiting does not
    /// abandon it: the slot is still filled, and `guard` is dropped only once
    /// the load is over.
    pub async fn get_or_load_holding<G>(
        &self,
        name: &str,
        guard: G,
    ) -> Result<(Arc<ModelHandle>, G), ModelLoadError>
    where
        G: Send + 'static,
    {
        let slot = self.slot(name);

        if let Some(handle) = slot.get() {
            return Ok((Arc::clone(handle), guard));
        }

        let runtime = Arc::clone(&self.runtime);
        let slots = Arc::clone(&self.slots);
        let owned = name.to_string();

        let task = tokio::spawn(async move {
            let result = slot
                .get_or_try_init(|| load(runtime, owned.clone()))
                .await
                .map(Arc::clone);

            if result.is_err() {
                discard_empty(&slots, &owned, &slot);
            }

            result.map(|handle| (handle, guard))
        });

        task.await.map_err(|e| LoadError::Interrupted {
            name: name.to_string(),
            reason: e.to_string(),
        })?
    }

    pub async fn describe(&self, name: &str) -> Result<ModelInfo, ModelLoadError> {
        Ok(self.get_or_load(name).await?.info())
    }

    pub async fn preload<I, S>(&self, names: I) -> Result<(), ModelLoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.get_or_load(name.as_ref()).await?;
        }
        Ok(())
    }

    /// Names of loaded models, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|s| s.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, name: &str) -> Slot {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(name.to_string()).or_default())
    }
}

async fn load(runtime: Arc<dyn ModelRuntime>, name: String) -> Result<Arc<ModelHandle>, ModelLoadError> {
    let started = Instant::now();
    tracing::info!(model = %name, "loading model");

    let owned = name.clone();
    let loaded = tokio::task::spawn_blocking(move || runtime.load_model(&owned))
        .await
        .map_err(|e| LoadError::Interrupted {
            name: name.clone(),
            reason: e.to_string(),
        })?;

    match loaded {
        Ok(handle) => {
            tracing::info!(
                model = %name,
                path = %handle.path().display(),
                architecture = handle.architecture(),
                context_length = handle.context_length(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "model loaded"
            );
            Ok(Arc::new(handle))
        }
        Err(e) => {
            tracing::warn!(model = %name, error = %e, "model load failed");
            Err(e.into())
        }
    }
}

// Drops the slot only when the map and this load hold the last references;
// anyone else still waiting retries the load on the same slot.
fn discard_empty(slots: &Mutex<HashMap<String, Slot>>, name: &str, slot: &Slot) {
    let mut slots = slots.lock();
    let unused = slots
        .get(name)
        .is_some_and(|s| Arc::ptr_eq(s, slot) && !s.initialized() && Arc::strong_count(s) == 2);
    if unused {
        slots.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{SamplingParams, TextTokenizer, TokenGenerator, TokenId};
    use crate::infra::layout::ModelLayout;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullTokenizer;

    impl TextTokenizer for NullTokenizer {
        fn encode(&self, _text: &str) -> anyhow::Result<Vec<TokenId>> {
            Ok(vec![])
        }

        fn decode(&self, _tokens: &[TokenId], _skip: bool) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    struct NullGenerator;

    impl TokenGenerator for NullGenerator {
        fn generate(&self, prompt: &[TokenId], _params: &SamplingParams) -> anyhow::Result<Vec<TokenId>> {
            Ok(prompt.to_vec())
        }
    }

    struct CountingRuntime {
        layout: ModelLayout,
        loads: AtomicUsize,
        delay: Duration,
    }

    impl CountingRuntime {
        fn new(root: &std::path::Path, delay: Duration) -> Self {
            Self {
                layout: ModelLayout::new(root),
                loads: AtomicUsize::new(0),
                delay,
            }
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelRuntime for CountingRuntime {
        fn load_model(&self, name: &str) -> Result<ModelHandle, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let dir = self.layout.resolve(name)?;
            Ok(ModelHandle::new(name, dir, Box::new(NullTokenizer), Box::new(NullGenerator))
                .with_context_length(4096)
                .with_architecture("llama"))
        }
    }

    fn setup(models: &[&str], delay: Duration) -> (tempfile::TempDir, Arc<CountingRuntime>, ModelRegistry) {
        let root = tempfile::tempdir().unwrap();
        for m in models {
            std::fs::create_dir(root.path().join(m)).unwrap();
        }
        let runtime = Arc::new(CountingRuntime::new(root.path(), delay));
        let registry = ModelRegistry::new(runtime.clone());
        (root, runtime, registry)
    }

    #[tokio::test]
    async fn test_missing_model_leaves_no_entry() {
        let (_root, _runtime, registry) = setup(&[], Duration::ZERO);

        let err = registry.get_or_load("ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.name, "ghost");
        assert!(!registry.contains("ghost"));
        assert!(registry.is_empty());
        assert!(registry.slots.lock().is_empty());
    }

    #[tokio::test]
    async fn test_loaded_once_then_cached() {
        let (_root, runtime, registry) = setup(&["deepseek-7b"], Duration::ZERO);

        let first = registry.get_or_load("deepseek-7b").await.unwrap();
        let second = registry.get_or_load("deepseek-7b").await.unwrap();
        let third = registry.get_or_load("deepseek-7b").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &third));
        assert_eq!(runtime.loads(), 1);
        assert_eq!(registry.loaded(), vec!["deepseek-7b".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_loads_single_flight() {
        let (_root, runtime, registry) = setup(&["m"], Duration::from_millis(100));
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_load("m").await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(runtime.loads(), 1);
        assert_eq!(handles.len(), 16);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_models_load_concurrently() {
        let (_root, runtime, registry) = setup(&["a", "b"], Duration::from_millis(200));

        let started = Instant::now();
        let (a, b) = tokio::join!(registry.get_or_load("a"), registry.get_or_load("b"));
        a.unwrap();
        b.unwrap();

        assert_eq!(runtime.loads(), 2);
        assert!(started.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let (root, runtime, registry) = setup(&[], Duration::ZERO);

        assert!(registry.get_or_load("late").await.is_err());
        std::fs::create_dir(root.path().join("late")).unwrap();
        let handle = registry.get_or_load("late").await.unwrap();

        assert_eq!(handle.name(), "late");
        assert_eq!(runtime.loads(), 2);
    }

    #[tokio::test]
    async fn test_describe_is_deterministic() {
        let (_root, runtime, registry) = setup(&["m"], Duration::ZERO);

        let expected = ModelInfo {
            model_name: "m".to_string(),
            max_length: 4096,
            architecture: "llama".to_string(),
        };
        for _ in 0..3 {
            assert_eq!(registry.describe("m").await.unwrap(), expected);
        }
        assert_eq!(runtime.loads(), 1);
    }

    #[tokio::test]
    async fn test_preload() {
        let (_root, runtime, registry) = setup(&["a", "b"], Duration::ZERO);

        registry.preload(["a", "b"]).await.unwrap();
        assert_eq!(registry.loaded(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.preload(["a", "missing"]).await.is_err());
        assert_eq!(runtime.loads(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abandoned_load_still_fills_slot() {
        let (_root, runtime, registry) = setup(&["m"], Duration::from_millis(300));

        let gave_up = tokio::time::timeout(Duration::from_millis(50), registry.get_or_load("m")).await;
        assert!(gave_up.is_err());

        let handle = registry.get_or_load("m").await.unwrap();
        assert_eq!(handle.name(), "m");
        assert_eq!(runtime.loads(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_guard_held_until_load_ends() {
        let (_root, _runtime, registry) = setup(&["m"], Duration::from_millis(200));
        let guard = Arc::new(());

        let gave_up = tokio::time::timeout(
            Duration::from_millis(20),
            registry.get_or_load_holding("m", Arc::clone(&guard)),
        )
        .await;
        assert!(gave_up.is_err());
        assert_eq!(Arc::strong_count(&guard), 2);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(Arc::strong_count(&guard), 1);
        assert!(registry.contains("m"));
    }
}
